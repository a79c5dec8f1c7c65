//! AWS Signature Version 4 request signing (HMAC-SHA256).
//!
//! Only what a single JSON `POST` needs: header-based signing with an
//! explicit list of signed headers. No presigned URLs, no chunked payloads.

use chrono::{DateTime, Utc};
use forwarder::CredentialError;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Who signs, for which region and service, at what time.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

impl SigningParams<'_> {
    /// `YYYYMMDD'T'HHMMSS'Z'`, the value of the `X-Amz-Date` header.
    pub fn amz_date(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn date(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    fn scope(&self) -> String {
        format!("{}/{}/{}/aws4_request", self.date(), self.region, self.service)
    }
}

/// The parts of an HTTP request covered by the signature.
///
/// `query` must already be in canonical form (sorted, URI-encoded).
/// Header names may be in any case; they are lower-cased for signing.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CredentialError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CredentialError::Configuration(format!("HMAC key error: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn canonical_headers(headers: &[(&str, &str)]) -> (String, String) {
    let mut normalised: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.to_ascii_lowercase(), value)
        })
        .collect();
    normalised.sort();

    let canonical = normalised
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    let signed = normalised
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (canonical, signed)
}

/// Builds the canonical request and returns it with the signed-headers list.
pub fn canonical_request(request: &SignableRequest<'_>) -> (String, String) {
    let (headers, signed) = canonical_headers(request.headers);
    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        headers,
        signed,
        sha256_hex(request.payload)
    );
    (canonical, signed)
}

/// Derives the per-day, per-region, per-service signing key.
pub fn signing_key(params: &SigningParams<'_>) -> Result<Vec<u8>, CredentialError> {
    let secret = format!("AWS4{}", params.secret_access_key);
    let k_date = hmac_sha256(secret.as_bytes(), params.date().as_bytes())?;
    let k_region = hmac_sha256(&k_date, params.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, params.service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Computes the hex signature for `request`.
pub fn signature(request: &SignableRequest<'_>, params: &SigningParams<'_>) -> Result<String, CredentialError> {
    let (canonical, _) = canonical_request(request);
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{}\n{}",
        params.amz_date(),
        params.scope(),
        sha256_hex(canonical.as_bytes())
    );
    let key = signing_key(params)?;
    Ok(hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?))
}

/// Computes the `Authorization` header value for `request`.
pub fn authorization(request: &SignableRequest<'_>, params: &SigningParams<'_>) -> Result<String, CredentialError> {
    let (_, signed_headers) = canonical_headers(request.headers);
    let signature = signature(request, params)?;
    Ok(format!(
        "{ALGORITHM} Credential={}/{}, SignedHeaders={signed_headers}, Signature={signature}",
        params.access_key_id,
        params.scope()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Published AWS example: IAM ListUsers, 2015-08-30 12:36:00 UTC.
    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn params() -> SigningParams<'static> {
        SigningParams {
            access_key_id: "AKIDEXAMPLE",
            secret_access_key: SECRET,
            region: "us-east-1",
            service: "iam",
            time: Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap(),
        }
    }

    const HEADERS: &[(&str, &str)] = &[
        ("Host", "iam.amazonaws.com"),
        ("Content-Type", "application/x-www-form-urlencoded; charset=utf-8"),
        ("X-Amz-Date", "20150830T123600Z"),
    ];

    fn request() -> SignableRequest<'static> {
        SignableRequest {
            method: "GET",
            path: "/",
            query: "Action=ListUsers&Version=2010-05-08",
            headers: HEADERS,
            payload: b"",
        }
    }

    #[test]
    fn canonical_request_matches_reference() {
        let (canonical, signed) = canonical_request(&request());
        assert_eq!(signed, "content-type;host;x-amz-date");
        assert_eq!(
            sha256_hex(canonical.as_bytes()),
            "f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59"
        );
    }

    #[test]
    fn signing_key_matches_reference() {
        assert_eq!(
            hex::encode(signing_key(&params()).unwrap()),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn authorization_header_matches_reference() {
        assert_eq!(params().amz_date(), "20150830T123600Z");
        assert_eq!(
            authorization(&request(), &params()).unwrap(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }
}
