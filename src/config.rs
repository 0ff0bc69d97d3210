// Worker configuration, read once from the environment at startup

use std::path::PathBuf;

const DEFAULT_ALLOWED_DOMAINS: &str = "youtube.com,youtu.be,vimeo.com,facebook.com,m.facebook.com,fb.watch,tiktok.com,instagram.com,twitter.com,x.com";

/// Immutable configuration value constructed in `main` and passed into each
/// component; never read from ambient process state after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub max_video_size_mb: u64,
    pub allowed_domains: Vec<String>,
    pub max_filename_length: usize,
    /// Ingress body limit for inbound requests
    pub max_request_size_mb: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: env_or("WORKER_HOST", "0.0.0.0"),
            port: env_or("WORKER_PORT", "5000").parse()?,
            download_dir: PathBuf::from(env_or("DOWNLOAD_DIR", "./downloads")),
            max_video_size_mb: env_or("MAX_VIDEO_SIZE_MB", "300").parse()?,
            allowed_domains: env_or("ALLOWED_DOMAINS", DEFAULT_ALLOWED_DOMAINS)
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            max_filename_length: env_or("MAX_FILENAME_LENGTH", "200").parse()?,
            max_request_size_mb: env_or("MAX_REQUEST_SIZE_MB", "500").parse()?,
        })
    }

    pub fn max_video_size_bytes(&self) -> u64 {
        self.max_video_size_mb * 1024 * 1024
    }

    pub fn max_request_size_bytes(&self) -> usize {
        (self.max_request_size_mb * 1024 * 1024) as usize
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allow_list_covers_supported_sites() {
        let domains: Vec<&str> = DEFAULT_ALLOWED_DOMAINS.split(',').collect();
        assert!(domains.contains(&"youtube.com"));
        assert!(domains.contains(&"fb.watch"));
        assert!(domains.contains(&"x.com"));
        assert_eq!(domains.len(), 10);
    }

    #[test]
    fn size_limits_convert_to_bytes() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 5000,
            download_dir: PathBuf::from("./downloads"),
            max_video_size_mb: 300,
            allowed_domains: vec![],
            max_filename_length: 200,
            max_request_size_mb: 500,
        };
        assert_eq!(config.max_video_size_bytes(), 300 * 1024 * 1024);
        assert_eq!(config.max_request_size_bytes(), 500 * 1024 * 1024);
    }
}
