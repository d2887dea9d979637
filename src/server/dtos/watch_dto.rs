use serde::Deserialize;
use validator::Validate;

use crate::database::watch::ContentType;

use super::non_blank;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertProgressDto {
    pub content_id: i64,
    pub content_type: ContentType,
    #[validate(length(max = 500), custom(function = "non_blank"))]
    pub title: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub progress: f64,
    #[validate(range(min = 0.0))]
    pub duration: Option<f64>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}
