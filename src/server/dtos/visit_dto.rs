use serde::{Deserialize, Serialize};
use validator::Validate;

use super::non_blank;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordVisitDto {
    #[validate(length(max = 128), custom(function = "non_blank"))]
    pub visitor_id: String,
    #[validate(length(max = 2048))]
    pub page_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordVisitResponseDto {
    pub recorded: bool,
}
