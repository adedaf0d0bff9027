use std::collections::HashMap;

use validator::{ValidationError, ValidationErrors};

fn error_message(error: &ValidationError) -> String {
    match &error.message {
        Some(m) => m.to_string(),
        None => error.code.to_string(),
    }
}

/// Flatten validator output into `field -> "msg, msg"` pairs, the shape the
/// page templates expect.
pub fn hash_map_from_validation_errors(e: &ValidationErrors) -> HashMap<String, String> {
    e.field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let msg = errs.iter().fold("".to_string(), |acc, x| {
                if acc.is_empty() {
                    error_message(x)
                } else {
                    format!("{}, {}", acc, error_message(x))
                }
            });
            (field.to_string(), msg)
        })
        .collect()
}

pub fn hash_map_to_string(hash_map: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = hash_map.iter().collect();
    pairs.sort();
    pairs.into_iter().fold("".to_string(), |acc, (field, msg)| {
        let new_msg = format!("{}: {}", field, msg);
        if acc.is_empty() {
            new_msg
        } else {
            format!("{}, {}", acc, new_msg)
        }
    })
}

/// Add a message-carrying error for `field` on top of what validator found.
pub fn add_field_error(
    errors: &mut ValidationErrors,
    field: &'static str,
    code: &'static str,
    message: &'static str,
) {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    errors.add(field, error);
}
