//! Format registry: maps a trailing extension or a `type=` override to a
//! formatter and Content-Type. Grounded on `cmd.c::cmd_select_format`'s
//! `funs[]` table.

use crate::parse::QueryParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    Json,
    Raw,
    CustomType,
}

#[derive(Debug, Clone)]
pub struct ResolvedFormat {
    pub formatter: Formatter,
    pub content_type: String,
    /// Set whenever the formatter is `CustomType` — the Content-Type the
    /// reply is expected to be framed with (from `type=` or the extension
    /// table). `None` is reserved for a CustomType reached without any
    /// forced mime, which the registry below never produces.
    pub forced_mime: Option<String>,
}

struct FormatDescriptor {
    ext: &'static str,
    formatter: Formatter,
    content_type: &'static str,
}

const REGISTRY: &[FormatDescriptor] = &[
    FormatDescriptor {
        ext: "json",
        formatter: Formatter::Json,
        content_type: "application/json",
    },
    FormatDescriptor {
        ext: "raw",
        formatter: Formatter::Raw,
        content_type: "binary/octet-stream",
    },
    FormatDescriptor {
        ext: "txt",
        formatter: Formatter::CustomType,
        content_type: "text/plain",
    },
    FormatDescriptor {
        ext: "html",
        formatter: Formatter::CustomType,
        content_type: "text/html",
    },
    FormatDescriptor {
        ext: "xhtml",
        formatter: Formatter::CustomType,
        content_type: "application/xhtml+xml",
    },
    FormatDescriptor {
        ext: "xml",
        formatter: Formatter::CustomType,
        content_type: "text/xml",
    },
    FormatDescriptor {
        ext: "png",
        formatter: Formatter::CustomType,
        content_type: "image/png",
    },
    FormatDescriptor {
        ext: "jpg",
        formatter: Formatter::CustomType,
        content_type: "image/jpeg",
    },
    FormatDescriptor {
        ext: "jpeg",
        formatter: Formatter::CustomType,
        content_type: "image/jpeg",
    },
];

/// `type=M/N` wins over the extension table, which wins over the JSON
/// default.
pub fn resolve(extension: Option<&str>, query: &QueryParams) -> ResolvedFormat {
    if let Some(mime) = &query.type_override {
        return ResolvedFormat {
            formatter: Formatter::CustomType,
            content_type: mime.clone(),
            forced_mime: Some(mime.clone()),
        };
    }

    if let Some(ext) = extension {
        if let Some(desc) = REGISTRY.iter().find(|d| d.ext.eq_ignore_ascii_case(ext)) {
            let forced_mime = match desc.formatter {
                Formatter::CustomType => Some(desc.content_type.to_string()),
                _ => None,
            };
            return ResolvedFormat {
                formatter: desc.formatter,
                content_type: desc.content_type.to_string(),
                forced_mime,
            };
        }
    }

    ResolvedFormat {
        formatter: Formatter::Json,
        content_type: "application/json".to_string(),
        forced_mime: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q() -> QueryParams {
        QueryParams::default()
    }

    #[test]
    fn no_extension_defaults_to_json() {
        let r = resolve(None, &q());
        assert_eq!(r.formatter, Formatter::Json);
        assert_eq!(r.content_type, "application/json");
    }

    #[test]
    fn extension_picks_formatter_and_content_type() {
        let r = resolve(Some("txt"), &q());
        assert_eq!(r.formatter, Formatter::CustomType);
        assert_eq!(r.content_type, "text/plain");
        assert_eq!(r.forced_mime.as_deref(), Some("text/plain"));
    }

    #[test]
    fn unknown_extension_falls_back_to_json() {
        let r = resolve(Some("bogus"), &q());
        assert_eq!(r.formatter, Formatter::Json);
    }

    #[test]
    fn type_override_wins_over_extension() {
        let mut query = q();
        query.type_override = Some("image/png".to_string());
        let r = resolve(Some("json"), &query);
        assert_eq!(r.formatter, Formatter::CustomType);
        assert_eq!(r.content_type, "image/png");
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let r = resolve(Some("JSON"), &q());
        assert_eq!(r.formatter, Formatter::Json);
    }
}
