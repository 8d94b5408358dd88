//! Extraction of diagrams embedded in Markdown

use crate::core::ParseError;

const START_DELIMITER: &str = "```plantuml";
const END_DELIMITER: &str = "```";

/// Return the body of the first ```` ```plantuml ```` block in `markdown`.
pub fn extract_plantuml(markdown: &str) -> Result<&str, ParseError> {
    let start = markdown
        .find(START_DELIMITER)
        .ok_or(ParseError::MissingPlantUml)?
        + START_DELIMITER.len();

    let length = markdown[start..]
        .find(END_DELIMITER)
        .ok_or(ParseError::UnterminatedPlantUml)?;

    Ok(&markdown[start..start + length])
}
