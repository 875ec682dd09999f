use thiserror::Error;
use url::Url;

use crate::{
    domain::{
        MAX_LINK_DESCRIPTION_CHARS, MAX_LINK_TITLE_CHARS, MAX_LINK_URL_CHARS,
        MAX_SECTION_NAME_CHARS,
    },
    error::ApiError,
    protocol::{CreateLinkRequest, UpdateLinkRequest},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("url is malformed: {0}")]
    MalformedUrl(String),
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        ApiError::validation(value.to_string())
    }
}

fn bounded(field: &'static str, raw: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

pub fn section_name(raw: &str) -> Result<String, ValidationError> {
    bounded("name", raw, MAX_SECTION_NAME_CHARS)
}

pub fn link_title(raw: &str) -> Result<String, ValidationError> {
    bounded("title", raw, MAX_LINK_TITLE_CHARS)
}

/// Normalizes a user-entered URL. Input without an http(s) scheme is treated
/// as `https://<input>`.
pub fn link_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = bounded("url", raw, MAX_LINK_URL_CHARS)?;
    let lowered = trimmed.to_ascii_lowercase();
    let candidate = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        trimmed
    } else {
        format!("https://{trimmed}")
    };

    let parsed =
        Url::parse(&candidate).map_err(|err| ValidationError::MalformedUrl(err.to_string()))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::MalformedUrl("missing host".into()));
    }
    Ok(candidate)
}

/// Blank descriptions are stored as absent.
pub fn link_description(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if raw.chars().count() > MAX_LINK_DESCRIPTION_CHARS {
        return Err(ValidationError::TooLong {
            field: "description",
            max: MAX_LINK_DESCRIPTION_CHARS,
        });
    }
    Ok(Some(raw.to_string()))
}

/// Returns the request with every present field normalized.
pub fn create_link(request: &CreateLinkRequest) -> Result<CreateLinkRequest, ValidationError> {
    Ok(CreateLinkRequest {
        title: link_title(&request.title)?,
        url: link_url(&request.url)?,
        description: link_description(request.description.as_deref())?,
        is_pinned: request.is_pinned,
        section_id: request.section_id,
    })
}

pub fn update_link(request: &UpdateLinkRequest) -> Result<UpdateLinkRequest, ValidationError> {
    Ok(UpdateLinkRequest {
        title: request.title.as_deref().map(link_title).transpose()?,
        url: request.url.as_deref().map(link_url).transpose()?,
        description: request
            .description
            .as_ref()
            .map(|value| link_description(value.as_deref()))
            .transpose()?,
        is_pinned: request.is_pinned,
        section_id: request.section_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_bounds_section_names() {
        assert_eq!(section_name("  Work ").expect("valid"), "Work");
        assert_eq!(
            section_name("   ").expect_err("blank"),
            ValidationError::Empty { field: "name" }
        );
        let long = "x".repeat(MAX_SECTION_NAME_CHARS + 1);
        assert!(matches!(
            section_name(&long),
            Err(ValidationError::TooLong { max: 100, .. })
        ));
        assert!(section_name(&"é".repeat(MAX_SECTION_NAME_CHARS)).is_ok());
    }

    #[test]
    fn prefixes_scheme_less_urls() {
        assert_eq!(
            link_url("example.com/a").expect("valid"),
            "https://example.com/a"
        );
        assert_eq!(
            link_url("http://example.com").expect("valid"),
            "http://example.com"
        );
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            link_url("https://"),
            Err(ValidationError::MalformedUrl(_))
        ));
        assert!(matches!(
            link_url("exa mple.com"),
            Err(ValidationError::MalformedUrl(_))
        ));
        assert!(matches!(link_url(""), Err(ValidationError::Empty { .. })));
    }

    #[test]
    fn update_keeps_absent_fields_absent_and_clears_blank_description() {
        let patch = UpdateLinkRequest {
            description: Some(Some("   ".into())),
            ..UpdateLinkRequest::default()
        };
        let normalized = update_link(&patch).expect("valid");
        assert_eq!(normalized.title, None);
        assert_eq!(normalized.description, Some(None));
    }

    #[test]
    fn update_rejects_blank_title() {
        let patch = UpdateLinkRequest {
            title: Some(" ".into()),
            ..UpdateLinkRequest::default()
        };
        let err: ApiError = update_link(&patch).expect_err("blank").into();
        assert_eq!(err.code, crate::error::ErrorCode::ValidationFailed);
    }
}
