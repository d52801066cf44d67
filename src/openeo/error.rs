use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use super::job::JobStatus;

#[derive(Debug)]
pub enum OpenEoError {
    Http(reqwest::Error),
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    Io(std::io::Error),
    Json(serde_json::Error),
    Udf { path: PathBuf, source: std::io::Error },
    MissingJobId,
    NoUsableApiVersion(String),
    JobFailed {
        job_id: String,
        status: JobStatus,
        logs: Vec<String>,
    },
}

impl fmt::Display for OpenEoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenEoError::Http(e) => write!(f, "HTTP error: {}", e),
            OpenEoError::Api {
                status,
                code: Some(code),
                message,
            } => write!(f, "[{}] {}: {}", status, code, message),
            OpenEoError::Api {
                status, message, ..
            } => write!(f, "[{}] {}", status, message),
            OpenEoError::Io(e) => write!(f, "I/O error: {}", e),
            OpenEoError::Json(e) => write!(f, "Failed to parse JSON: {}", e),
            OpenEoError::Udf { path, source } => {
                write!(f, "Failed to read UDF {}: {}", path.display(), source)
            }
            OpenEoError::MissingJobId => {
                write!(f, "back-end did not return an identifier for the new job")
            }
            OpenEoError::NoUsableApiVersion(url) => {
                write!(f, "{} does not advertise a usable openEO API version", url)
            }
            OpenEoError::JobFailed {
                job_id,
                status,
                logs,
            } => {
                write!(f, "batch job {} ended with status '{}'", job_id, status)?;
                for line in logs {
                    write!(f, "\n  {}", line)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for OpenEoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenEoError::Http(e) => Some(e),
            OpenEoError::Io(e) => Some(e),
            OpenEoError::Json(e) => Some(e),
            OpenEoError::Udf { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OpenEoError {
    fn from(err: reqwest::Error) -> Self {
        OpenEoError::Http(err)
    }
}

impl From<std::io::Error> for OpenEoError {
    fn from(err: std::io::Error) -> Self {
        OpenEoError::Io(err)
    }
}

impl From<serde_json::Error> for OpenEoError {
    fn from(err: serde_json::Error) -> Self {
        OpenEoError::Json(err)
    }
}

/// Error for a non-success response, using the openEO error body when it parses.
pub fn api_error(status: u16, body: &str) -> OpenEoError {
    #[derive(Deserialize)]
    struct ErrorBody {
        code: Option<String>,
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => OpenEoError::Api {
            status,
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => OpenEoError::Api {
            status,
            code: None,
            message: body.trim().to_string(),
        },
    }
}

pub type Result<T> = std::result::Result<T, OpenEoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_openeo_body() {
        let err = api_error(
            400,
            r#"{"id": "r-123", "code": "CollectionNotFound", "message": "Collection 'FOO' does not exist."}"#,
        );
        assert_eq!(
            err.to_string(),
            "[400] CollectionNotFound: Collection 'FOO' does not exist."
        );
    }

    #[test]
    fn test_api_error_from_plain_body() {
        let err = api_error(502, "Bad Gateway\n");
        assert!(matches!(err, OpenEoError::Api { status: 502, code: None, .. }));
        assert_eq!(err.to_string(), "[502] Bad Gateway");
    }

    #[test]
    fn test_job_failure_lists_logs() {
        let err = OpenEoError::JobFailed {
            job_id: "j-42".to_string(),
            status: JobStatus::Error,
            logs: vec!["UDF raised an exception".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "batch job j-42 ended with status 'error'\n  UDF raised an exception"
        );
    }
}
