//! Document identifier checks for path parameters.

use crate::error::FieldError;

/// 24 hexadecimal characters.
pub fn is_object_id(candidate: &str) -> bool {
    candidate.len() == 24 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check the named path parameters, reporting every malformed one.
pub fn check_path_ids<'a>(
    params: impl IntoIterator<Item = (&'a str, &'a str)>,
    names: &[&str],
) -> Result<(), Vec<FieldError>> {
    let errors: Vec<FieldError> = params
        .into_iter()
        .filter(|(name, value)| names.contains(name) && !is_object_id(value))
        .map(|(name, value)| {
            FieldError::new(name, format!("Invalid {name} format")).with_value(value.into())
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
