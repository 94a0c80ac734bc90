//! Security heuristics applied before admission.

use regex::Regex;
use std::sync::LazyLock;

/// Absolute size ceiling regardless of policy (zip-bomb guard).
pub const HARD_SIZE_CAP_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Bytes of text-like content scanned for embedded script markers.
pub const SCRIPT_SCAN_LEN: usize = 256 * 1024;

const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "pif", "msi", "msp", "vbs", "vbe", "js", "jse", "wsf",
    "wsh", "ps1", "psm1", "sh", "bash", "jar", "app", "dll", "cpl", "hta", "reg", "lnk", "apk",
    "dmg", "deb", "rpm", "gadget", "inf",
];

const OS_METADATA_NAMES: &[&str] = &[
    ".ds_store",
    "thumbs.db",
    "ehthumbs.db",
    "desktop.ini",
    "icon\r",
    ".spotlight-v100",
    ".trashes",
    ".fseventsd",
];

static SCRIPT_MARKERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)<\s*script\b", "script tag"),
        (r"(?i)javascript\s*:", "javascript: URL"),
        (r"(?i)<[^>]*\son[a-z]+\s*=", "inline event handler"),
        (r"(?i)\beval\s*\(", "eval call"),
        (r"(?i)\bnew\s+function\s*\(", "Function constructor"),
        (r"(?i)\bdocument\s*\.\s*write\s*\(", "document.write call"),
        (r#"(?i)\bset(?:timeout|interval)\s*\(\s*["']"#, "string timer"),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        (
            Regex::new(pattern).expect("script marker pattern is valid"),
            label,
        )
    })
    .collect()
});

/// Whether the file name ends with an executable extension.
pub fn has_executable_extension(name: &str) -> bool {
    extensions(name)
        .last()
        .is_some_and(|ext| is_executable(ext))
}

/// Whether an executable extension hides among several extensions, e.g. `invoice.pdf.exe`
/// or `invoice.exe.pdf`.
pub fn has_double_extension(name: &str) -> bool {
    let exts = extensions(name);
    exts.len() >= 2 && exts.iter().any(|ext| is_executable(ext))
}

/// Whether the name belongs to operating-system metadata rather than a document.
pub fn is_os_metadata(name: &str) -> bool {
    let lower = name.to_lowercase();
    OS_METADATA_NAMES.contains(&lower.as_str())
        || lower.starts_with("._")
        || lower.starts_with("__macosx")
}

/// Whether content of this MIME type is scanned for script markers.
pub fn is_text_like(mime_type: &str) -> bool {
    mime_type.starts_with("text/")
        || matches!(
            mime_type,
            "application/json"
                | "application/xml"
                | "application/xhtml+xml"
                | "application/javascript"
                | "image/svg+xml"
        )
}

/// Labels of the script markers found in `content`.
pub fn find_script_markers(content: &[u8]) -> Vec<&'static str> {
    let text = String::from_utf8_lossy(content);
    SCRIPT_MARKERS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(&text))
        .map(|(_, label)| *label)
        .collect()
}

fn is_executable(ext: &str) -> bool {
    EXECUTABLE_EXTENSIONS.contains(&ext)
}

/// Lower-cased extensions after the first dot, ignoring a leading dot on hidden files.
fn extensions(name: &str) -> Vec<String> {
    let trimmed = name.trim().trim_start_matches('.');
    trimmed
        .split('.')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.trim().to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_suffix_detected() {
        assert!(has_executable_extension("budget.exe"));
        assert!(has_executable_extension("Budget.EXE"));
        assert!(!has_executable_extension("budget.xlsx"));
        assert!(!has_executable_extension("exe"));
    }

    #[test]
    fn double_extension_detected_in_either_position() {
        assert!(has_double_extension("invoice.pdf.exe"));
        assert!(has_double_extension("invoice.exe.pdf"));
        assert!(!has_double_extension("budget.exe"));
        assert!(!has_double_extension("report.final.pdf"));
    }

    #[test]
    fn os_metadata_names() {
        assert!(is_os_metadata(".DS_Store"));
        assert!(is_os_metadata("Thumbs.db"));
        assert!(is_os_metadata("._invoice.pdf"));
        assert!(!is_os_metadata("invoice.pdf"));
    }

    #[test]
    fn script_markers_found_in_text() {
        let markers = find_script_markers(b"<p onclick='x()'>hi</p><SCRIPT>eval(atob(s))</script>");
        assert!(markers.contains(&"script tag"));
        assert!(markers.contains(&"inline event handler"));
        assert!(markers.contains(&"eval call"));
        assert!(find_script_markers(b"date,amount\n2024-01-01,12.00\n").is_empty());
    }

    #[test]
    fn prose_is_clean() {
        assert!(find_script_markers(b"The evaluation (see appendix) is done.").is_empty());
        assert!(find_script_markers(b"one = two; online=true").is_empty());
    }
}
