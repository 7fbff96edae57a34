use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Computes the deterministic scoring fingerprint for an
/// (application, ordered answer list) pair.
///
/// The same app id and the same answers in the same order always hash to
/// the same value; reordering or editing any answer changes it. Answers
/// are length-prefixed so no two distinct sequences can serialize to the
/// same byte string.
pub fn scoring_fingerprint(app_id: u64, answers: &[String]) -> String {
    let mut parts = Vec::with_capacity(answers.len() + 1);
    parts.push(format!("app={app_id}"));
    for a in answers {
        parts.push(format!("{}:{}", a.len(), a));
    }
    sha256_hex(&parts.join("\n"))
}
