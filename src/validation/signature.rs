//! Binary signature (magic number) verification.

/// Number of leading bytes inspected for signatures.
pub const SIGNATURE_PROBE_LEN: usize = 32;

struct Signature {
    offset: usize,
    bytes: &'static [u8],
}

const fn at(offset: usize, bytes: &'static [u8]) -> Signature {
    Signature { offset, bytes }
}

const PDF: &[Signature] = &[at(0, b"%PDF")];
const PNG: &[Signature] = &[at(0, b"\x89PNG\r\n\x1a\n")];
const JPEG: &[Signature] = &[at(0, b"\xFF\xD8\xFF")];
const GIF: &[Signature] = &[at(0, b"GIF87a"), at(0, b"GIF89a")];
const TIFF: &[Signature] = &[at(0, b"II*\x00"), at(0, b"MM\x00*")];
const BMP: &[Signature] = &[at(0, b"BM")];
const WEBP: &[Signature] = &[at(0, b"RIFF"), at(8, b"WEBP")];
const OLE: &[Signature] = &[at(0, b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1")];
const ZIP: &[Signature] = &[at(0, b"PK\x03\x04")];
const RTF: &[Signature] = &[at(0, b"{\\rtf")];

enum Rule {
    /// Any one signature must match.
    AnyOf(&'static [Signature]),
    /// Every signature must match.
    AllOf(&'static [Signature]),
}

fn rule_for(mime_type: &str) -> Option<Rule> {
    let rule = match mime_type {
        "application/pdf" => Rule::AnyOf(PDF),
        "image/png" => Rule::AnyOf(PNG),
        "image/jpeg" | "image/jpg" => Rule::AnyOf(JPEG),
        "image/gif" => Rule::AnyOf(GIF),
        "image/tiff" => Rule::AnyOf(TIFF),
        "image/bmp" => Rule::AnyOf(BMP),
        "image/webp" => Rule::AllOf(WEBP),
        "application/msword" | "application/vnd.ms-excel" | "application/vnd.ms-powerpoint" => {
            Rule::AnyOf(OLE)
        }
        "application/zip"
        | "application/epub+zip"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Rule::AnyOf(ZIP)
        }
        "application/rtf" | "text/rtf" => Rule::AnyOf(RTF),
        _ => return None,
    };
    Some(rule)
}

/// Whether a signature is registered for the MIME type.
pub fn has_known_signature(mime_type: &str) -> bool {
    rule_for(mime_type).is_some()
}

/// Compare the leading bytes against the signatures registered for `mime_type`.
///
/// Types without a registered signature always match.
pub fn matches_signature(mime_type: &str, head: &[u8]) -> bool {
    let hit = |signature: &Signature| {
        head.get(signature.offset..signature.offset + signature.bytes.len())
            .is_some_and(|window| window == signature.bytes)
    };
    match rule_for(mime_type) {
        None => true,
        Some(Rule::AnyOf(signatures)) => signatures.iter().any(hit),
        Some(Rule::AllOf(signatures)) => signatures.iter().all(hit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_requires_header() {
        assert!(matches_signature("application/pdf", b"%PDF-1.4\n"));
        assert!(!matches_signature("application/pdf", b"MZ\x90\x00"));
        assert!(!matches_signature("application/pdf", b""));
    }

    #[test]
    fn office_open_xml_is_zip() {
        let docx = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
        assert!(matches_signature(docx, b"PK\x03\x04\x14\x00"));
        assert!(!matches_signature(docx, b"%PDF"));
    }

    #[test]
    fn webp_checks_both_offsets() {
        assert!(matches_signature("image/webp", b"RIFF\x10\x00\x00\x00WEBPVP8 "));
        assert!(!matches_signature("image/webp", b"RIFF\x10\x00\x00\x00WAVEfmt "));
    }

    #[test]
    fn unknown_types_pass_through() {
        assert!(!has_known_signature("text/plain"));
        assert!(matches_signature("text/plain", b"anything"));
    }
}
