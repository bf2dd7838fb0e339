use pubdate_common::{DateError, ExtractOptions};
use pubdate_extract::ExtractionResult;

/// Terminal result of one extraction job.
pub type JobOutcome = Result<ExtractionResult, DateError>;

/// Identity of a request for coalescing and caching: the same URL asked
/// with and without the modify pass are different requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub url: String,
    pub check_modified: bool,
}

impl JobKey {
    pub fn new(url: &str, check_modified: bool) -> Self {
        Self {
            url: url.trim().to_string(),
            check_modified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub key: JobKey,
    pub options: ExtractOptions,
    /// Completed attempts so far.
    pub attempt: u32,
}

impl Job {
    pub fn new(key: JobKey, options: ExtractOptions) -> Self {
        Self {
            id: job_id(&key),
            key,
            options,
            attempt: 0,
        }
    }

    pub fn priority(&self) -> i32 {
        self.options.priority.unwrap_or(0)
    }
}

/// Deterministic id for a request. The queue keeps at most one job per key
/// in flight, so equal ids never collide.
pub fn job_id(key: &JobKey) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.url.as_bytes());
    hasher.update(&[u8::from(key.check_modified)]);
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic_per_key() {
        let a = job_id(&JobKey::new("https://a.test/1", false));
        assert_eq!(a, job_id(&JobKey::new(" https://a.test/1", false)));
        assert_eq!(a.len(), 32);
        assert_ne!(a, job_id(&JobKey::new("https://a.test/2", false)));
        assert_ne!(a, job_id(&JobKey::new("https://a.test/1", true)));
    }

    #[test]
    fn keys_separate_the_modify_pass() {
        assert_ne!(
            JobKey::new("https://a.test/1", false),
            JobKey::new("https://a.test/1", true)
        );
        assert_eq!(
            JobKey::new(" https://a.test/1 ", false),
            JobKey::new("https://a.test/1", false)
        );
    }
}
