//! File name safety checks.

/// Longest accepted file name, in characters.
pub const MAX_FILENAME_LENGTH: usize = 255;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const ILLEGAL_CHARACTERS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Return one message per problem found in `name`; empty when the name is safe.
pub fn check_filename(name: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if name.trim().is_empty() {
        problems.push("File name is empty".to_string());
        return problems;
    }

    if name.chars().any(char::is_control) {
        problems.push("File name contains control characters".to_string());
    }

    if name.contains("..") || name.contains('/') || name.contains('\\') {
        problems.push("File name contains path traversal sequences".to_string());
    }

    if name.chars().any(|c| ILLEGAL_CHARACTERS.contains(&c)) {
        problems.push(format!(
            "File name contains characters that are not allowed ({})",
            ILLEGAL_CHARACTERS.iter().collect::<String>()
        ));
    }

    if is_reserved_device_name(name) {
        problems.push(format!("'{name}' is a reserved system name"));
    }

    if name.ends_with(char::is_whitespace) {
        problems.push("File name must not end with whitespace".to_string());
    }

    if name.starts_with('-') {
        problems.push("File name must not start with a dash".to_string());
    }

    let length = name.chars().count();
    if length > MAX_FILENAME_LENGTH {
        problems.push(format!(
            "File name is too long ({length} characters, maximum {MAX_FILENAME_LENGTH})"
        ));
    }

    problems
}

fn is_reserved_device_name(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name).trim_end();
    RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
}
