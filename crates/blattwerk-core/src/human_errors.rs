// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language error messages for the command line.
//
// Every technical error maps to a short message and a concrete next step.

use crate::error::BlattwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout; running again may succeed.
    Transient,
    /// The user must change something (install a tool, fix a path).
    ActionRequired,
    /// Retrying will not help.
    Permanent,
}

/// A human-readable error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n  {}", self.message, self.suggestion)
    }
}

pub fn humanize_error(err: &BlattwerkError) -> HumanError {
    match err {
        BlattwerkError::UnsupportedDocument(detail) => HumanError {
            message: "This document can't be translated.".into(),
            suggestion: format!("Only PDF files are supported. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        BlattwerkError::PdfError(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged or encrypted. Try re-saving it from a PDF viewer.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        BlattwerkError::ImageError(_) => HumanError {
            message: "A page image couldn't be processed.".into(),
            suggestion: "Try a lower DPI, or check that there is enough free memory.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        BlattwerkError::RasterError(detail) => humanize_tool_error("pdftoppm (poppler-utils)", detail),

        BlattwerkError::OcrError(detail) => humanize_tool_error("tesseract", detail),

        BlattwerkError::Translation(detail) => {
            let lower = detail.to_ascii_lowercase();
            if lower.contains("429") || lower.contains("too many") {
                HumanError {
                    message: "The translation service is rate limiting us.".into(),
                    suggestion: "Wait a few minutes and run again. Finished strings are cached.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            } else {
                HumanError {
                    message: "The translation service didn't answer.".into(),
                    suggestion: "Check your internet connection and run again.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        BlattwerkError::CacheStore(_) => HumanError {
            message: "The translation cache couldn't be saved.".into(),
            suggestion: "Check that the cache file's folder is writable.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BlattwerkError::PageFailed { page, .. } => HumanError {
            message: format!("Page {} couldn't be translated.", page + 1),
            suggestion: "Check the log for the cause, or try a higher DPI for better recognition.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        BlattwerkError::AllPagesFailed { pages, .. } => HumanError {
            message: format!("None of the {pages} pages could be translated."),
            suggestion: "Check that the OCR engine is installed, then look in the log for the first error.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        BlattwerkError::TimedOut(_) => HumanError {
            message: "A step took too long and was stopped.".into(),
            suggestion: "Try again, or raise the timeouts in the config file.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        BlattwerkError::Cancelled => HumanError {
            message: "Translation was cancelled.".into(),
            suggestion: "No output file was written.".into(),
            retriable: true,
            severity: Severity::Permanent,
        },

        BlattwerkError::Config(detail) => HumanError {
            message: "The settings aren't valid.".into(),
            suggestion: detail.clone(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BlattwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The file couldn't be found.".into(),
                suggestion: "Check the path and try again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "Permission denied.".into(),
                suggestion: "Check that you can read the input and write to its folder.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        BlattwerkError::Serialization(_) => HumanError {
            message: "A settings or cache file is malformed.".into(),
            suggestion: "Fix or delete the JSON file and run again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

/// External tool failures: distinguish "not installed" from "ran and failed".
fn humanize_tool_error(tool: &str, detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("no such file") || lower.contains("failed to launch") {
        HumanError {
            message: format!("{tool} isn't installed or isn't on PATH."),
            suggestion: format!("Install {tool}, or set its path in the config file."),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: format!("{tool} reported an error."),
            suggestion: format!("Try a different DPI or check the input file. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_action_required() {
        let err = BlattwerkError::OcrError("failed to launch tesseract: No such file or directory".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.message.contains("tesseract"));
    }

    #[test]
    fn rate_limit_is_transient() {
        let human = humanize_error(&BlattwerkError::Translation("HTTP 429 Too Many Requests".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn page_numbers_are_one_based_for_users() {
        let human = humanize_error(&BlattwerkError::PageFailed {
            page: 0,
            reason: "ocr".into(),
        });
        assert!(human.message.starts_with("Page 1 "));
    }

    #[test]
    fn all_pages_failing_does_not_blame_one_page() {
        let human = humanize_error(&BlattwerkError::AllPagesFailed {
            pages: 4,
            first_error: "page 1 failed: ocr".into(),
        });
        assert_eq!(human.message, "None of the 4 pages could be translated.");
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn unreadable_pdf_is_permanent() {
        let human = humanize_error(&BlattwerkError::PdfError("invalid xref".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }
}
