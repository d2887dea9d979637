use validator::ValidationError;

pub mod channel_dto;
pub mod health_dto;
pub mod relay_dto;
pub mod visit_dto;
pub mod watch_dto;

/// rejects empty and whitespace only strings
pub fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}
