// FormSnap - core/patch.rs
//
// Icon embedding for WinForms entry forms.
//
// Two text edits, both idempotent:
//   - <Form>.resx: the `$this.Icon` data entry holds the base64 icon,
//     replaced in place when present, inserted before `</root>` otherwise.
//   - <Form>.Designer.cs: InitializeComponent() loads the icon from the
//     form's resources.
//
// Edits splice the original text at match offsets rather than re-serialising
// the XML, so formatting, comments and the file's newline style survive.

use crate::core::model::ProjectDescriptor;
use crate::util::constants;
use crate::util::error::PatchError;
use base64::Engine as _;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// What a patch run changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub form: String,
    pub resx: PathBuf,
    pub resx_changed: bool,
    pub designer: PathBuf,
    pub designer_changed: bool,
}

/// Embeds one icon into the entry form of each project it is given.
#[derive(Debug, Clone)]
pub struct ResourcePatcher {
    icon_path: PathBuf,
    encoded_icon: String,
}

impl ResourcePatcher {
    /// Read and encode `icon_path`.
    pub fn new(icon_path: &Path) -> Result<Self, PatchError> {
        let meta = fs::metadata(icon_path).map_err(|_| PatchError::IconNotFound {
            path: icon_path.to_path_buf(),
        })?;
        if !meta.is_file() {
            return Err(PatchError::IconNotFound {
                path: icon_path.to_path_buf(),
            });
        }
        if meta.len() > constants::MAX_ICON_FILE_SIZE {
            return Err(PatchError::IconTooLarge {
                path: icon_path.to_path_buf(),
                size: meta.len(),
                max_size: constants::MAX_ICON_FILE_SIZE,
            });
        }

        let bytes = fs::read(icon_path).map_err(|source| PatchError::Io {
            path: icon_path.to_path_buf(),
            operation: "read icon",
            source,
        })?;
        tracing::debug!(icon = %icon_path.display(), bytes = bytes.len(), "Icon loaded");

        Ok(Self {
            icon_path: icon_path.to_path_buf(),
            encoded_icon: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn icon_path(&self) -> &Path {
        &self.icon_path
    }

    /// Patch the entry form of `project`.
    ///
    /// Both edits are computed before either file is written, so a designer
    /// problem leaves the resource file untouched.
    pub fn patch(&self, project: &ProjectDescriptor) -> Result<PatchReport, PatchError> {
        let form = project
            .entry_form
            .as_ref()
            .ok_or_else(|| PatchError::EntryFormNotFound {
                project: project.dir.clone(),
            })?;
        let designer = form
            .designer
            .as_ref()
            .ok_or_else(|| PatchError::DesignerNotFound {
                form: form.name.clone(),
                project: project.dir.clone(),
            })?;

        let resx_text = read_text(&form.resx)?;
        let resx_update = match apply_resx_icon(&resx_text, &self.encoded_icon) {
            ResxPatch::Unchanged => None,
            ResxPatch::Updated(text) => Some(text),
            ResxPatch::MissingRoot => {
                return Err(PatchError::MalformedResource {
                    path: form.resx.clone(),
                })
            }
        };

        let designer_text = read_text(designer)?;
        let designer_update = match apply_designer_icon(&designer_text, &form.name) {
            DesignerPatch::Unchanged => None,
            DesignerPatch::Updated(text) => Some(text),
            DesignerPatch::MissingInitializeComponent => {
                return Err(PatchError::InitializeComponentNotFound {
                    path: designer.clone(),
                })
            }
        };

        let resx_changed = resx_update.is_some();
        if let Some(text) = resx_update {
            write_text(&form.resx, &text)?;
        }
        let designer_changed = designer_update.is_some();
        if let Some(text) = designer_update {
            write_text(designer, &text)?;
        }

        tracing::info!(
            project = %project.name,
            form = %form.name,
            resx_changed,
            designer_changed,
            "Icon patch applied"
        );

        Ok(PatchReport {
            form: form.name.clone(),
            resx: form.resx.clone(),
            resx_changed,
            designer: designer.clone(),
            designer_changed,
        })
    }
}

fn read_text(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        operation: "read",
        source,
    })
}

fn write_text(path: &Path, text: &str) -> Result<(), PatchError> {
    fs::write(path, text).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        operation: "write",
        source,
    })
}

fn newline_of(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

// =============================================================================
// .resx
// =============================================================================

/// Outcome of [`apply_resx_icon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResxPatch {
    Unchanged,
    Updated(String),
    /// No `</root>` to insert a new entry before.
    MissingRoot,
}

fn icon_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<data\b[^>]*\bname\s*=\s*"\$this\.Icon"[^>]*>\s*<value>(.*?)</value>"#)
            .expect("icon value regex is valid")
    })
}

/// The `<value>` body for `encoded`: one indented line per 80 characters.
fn icon_value_text(encoded: &str, nl: &str) -> String {
    let line_sep = format!("{nl}{}", constants::BASE64_LINE_INDENT);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(constants::BASE64_LINE_WIDTH)
        // base64 output is ASCII, so byte chunks are valid UTF-8.
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    format!(
        "{line_sep}{}{nl}{}",
        lines.join(&line_sep),
        constants::VALUE_CLOSE_INDENT
    )
}

/// Set the `$this.Icon` entry of a resource file to `encoded`.
pub fn apply_resx_icon(content: &str, encoded: &str) -> ResxPatch {
    let nl = newline_of(content);
    let value = icon_value_text(encoded, nl);

    if let Some(existing) = icon_value_regex()
        .captures(content)
        .and_then(|c| c.get(1))
    {
        if existing.as_str() == value {
            return ResxPatch::Unchanged;
        }
        let mut out = String::with_capacity(content.len() + value.len());
        out.push_str(&content[..existing.start()]);
        out.push_str(&value);
        out.push_str(&content[existing.end()..]);
        return ResxPatch::Updated(out);
    }

    let Some(root_close) = content.rfind("</root>") else {
        return ResxPatch::MissingRoot;
    };
    let entry = format!(
        "  <data name=\"{name}\" type=\"{ty}\" mimetype=\"{mime}\">{nl}    <value>{value}</value>{nl}  </data>{nl}",
        name = constants::ICON_RESOURCE_NAME,
        ty = constants::ICON_RESOURCE_TYPE,
        mime = constants::ICON_RESOURCE_MIMETYPE,
    );
    let mut out = String::with_capacity(content.len() + entry.len());
    out.push_str(&content[..root_close]);
    out.push_str(&entry);
    out.push_str(&content[root_close..]);
    ResxPatch::Updated(out)
}

// =============================================================================
// Designer source
// =============================================================================

/// Outcome of [`apply_designer_icon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesignerPatch {
    Unchanged,
    Updated(String),
    MissingInitializeComponent,
}

fn initialize_component_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bvoid\s+InitializeComponent\s*\(\s*\)\s*\{")
            .expect("InitializeComponent regex is valid")
    })
}

fn icon_assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bthis\s*\.\s*Icon\s*=").expect("icon assignment regex is valid")
    })
}

fn resources_declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bresources\s*=\s*new\s+[\w.]*ComponentResourceManager\b[^;]*;")
            .expect("resources declaration regex is valid")
    })
}

const DEFAULT_BODY_INDENT: &str = "            ";

/// Leading whitespace of the first non-blank line after `offset`.
fn body_indent(content: &str, offset: usize) -> &str {
    content[offset..]
        .lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())
        .map(|l| &l[..l.len() - l.trim_start().len()])
        .unwrap_or(DEFAULT_BODY_INDENT)
}

/// Byte offset of the `}` closing the block whose `{` ends at `open_end`,
/// or the end of `content` when the braces never balance. Braces inside
/// string literals, char literals and comments are ignored.
fn block_end(content: &str, open_end: usize) -> usize {
    let bytes = content.as_bytes();
    let mut depth = 1usize;
    let mut i = open_end;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = content[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = content[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            b'@' if bytes.get(i + 1) == Some(&b'"') => {
                // Verbatim string: `""` is an escaped quote.
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == b'"' {
                        if bytes.get(i + 1) == Some(&b'"') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Make `InitializeComponent()` of `form` assign the icon from resources.
///
/// Only the body of `InitializeComponent` is inspected; assignments and
/// declarations in other members do not count.
pub fn apply_designer_icon(content: &str, form: &str) -> DesignerPatch {
    let Some(init) = initialize_component_regex().find(content) else {
        return DesignerPatch::MissingInitializeComponent;
    };
    let body = &content[init.end()..block_end(content, init.end())];
    if icon_assignment_regex().is_match(body) {
        return DesignerPatch::Unchanged;
    }

    let nl = newline_of(content);
    let indent = body_indent(content, init.end());
    let assignment = format!(
        "{nl}{indent}this.Icon = ((System.Drawing.Icon)(resources.GetObject(\"{}\")));",
        constants::ICON_RESOURCE_NAME
    );

    let (at, insert) = match resources_declaration_regex().find(body) {
        Some(decl) => (init.end() + decl.end(), assignment),
        None => (
            init.end(),
            format!(
                "{nl}{indent}System.ComponentModel.ComponentResourceManager resources = \
                 new System.ComponentModel.ComponentResourceManager(typeof({form}));{assignment}"
            ),
        ),
    };

    let mut out = String::with_capacity(content.len() + insert.len());
    out.push_str(&content[..at]);
    out.push_str(&insert);
    out.push_str(&content[at..]);
    DesignerPatch::Updated(out)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::EntryForm;

    const RESX_WITHOUT_ICON: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<root>\n  <resheader name=\"resmimetype\">\n    <value>text/microsoft-resx</value>\n  </resheader>\n</root>\n";

    const DESIGNER: &str = "namespace Demo\n{\n    partial class MainForm\n    {\n        private void InitializeComponent()\n        {\n            this.SuspendLayout();\n            this.Text = \"Demo\";\n        }\n    }\n}\n";

    fn updated(p: ResxPatch) -> String {
        match p {
            ResxPatch::Updated(s) => s,
            other => panic!("expected update, got {other:?}"),
        }
    }

    fn updated_designer(p: DesignerPatch) -> String {
        match p {
            DesignerPatch::Updated(s) => s,
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn inserts_icon_entry_before_root_close() {
        let out = updated(apply_resx_icon(RESX_WITHOUT_ICON, "QUJD"));
        assert!(out.contains(
            "<data name=\"$this.Icon\" type=\"System.Drawing.Icon, System.Drawing\" \
             mimetype=\"application/x-microsoft.net.object.bytearray.base64\">"
        ));
        assert!(out.contains("<value>\n        QUJD\n    </value>"));
        assert!(out.trim_end().ends_with("</root>"));
        assert!(out.starts_with("<?xml"));
    }

    #[test]
    fn resx_patch_is_idempotent() {
        let once = updated(apply_resx_icon(RESX_WITHOUT_ICON, "QUJD"));
        assert_eq!(apply_resx_icon(&once, "QUJD"), ResxPatch::Unchanged);
        assert_eq!(once.matches("$this.Icon").count(), 1);
    }

    #[test]
    fn existing_icon_value_is_replaced_in_place() {
        let once = updated(apply_resx_icon(RESX_WITHOUT_ICON, "T0xE"));
        let twice = updated(apply_resx_icon(&once, "TkVX"));
        assert!(twice.contains("TkVX"));
        assert!(!twice.contains("T0xE"));
        assert_eq!(twice.matches("$this.Icon").count(), 1);
    }

    #[test]
    fn long_base64_is_wrapped_at_80_columns() {
        let encoded = "A".repeat(170);
        let out = updated(apply_resx_icon(RESX_WITHOUT_ICON, &encoded));
        let lines: Vec<&str> = out
            .lines()
            .filter(|l| l.trim_start().starts_with('A'))
            .map(str::trim)
            .collect();
        assert_eq!(lines.iter().map(|l| l.len()).collect::<Vec<_>>(), vec![80, 80, 10]);
    }

    #[test]
    fn crlf_files_stay_crlf() {
        let crlf = RESX_WITHOUT_ICON.replace('\n', "\r\n");
        let out = updated(apply_resx_icon(&crlf, "QUJD"));
        assert!(!out.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn resx_without_root_is_malformed() {
        assert_eq!(apply_resx_icon("<data/>", "QUJD"), ResxPatch::MissingRoot);
    }

    #[test]
    fn designer_gets_resources_and_icon_lines() {
        let out = updated_designer(apply_designer_icon(DESIGNER, "MainForm"));
        assert!(out.contains(
            "        {\n            System.ComponentModel.ComponentResourceManager resources = \
             new System.ComponentModel.ComponentResourceManager(typeof(MainForm));\n            \
             this.Icon = ((System.Drawing.Icon)(resources.GetObject(\"$this.Icon\")));\n            \
             this.SuspendLayout();"
        ));
    }

    #[test]
    fn designer_patch_is_idempotent() {
        let once = updated_designer(apply_designer_icon(DESIGNER, "MainForm"));
        assert_eq!(
            apply_designer_icon(&once, "MainForm"),
            DesignerPatch::Unchanged
        );
        assert_eq!(once.matches("ComponentResourceManager resources").count(), 1);
    }

    #[test]
    fn existing_resources_declaration_is_reused() {
        let with_resources = DESIGNER.replace(
            "            this.SuspendLayout();",
            "            System.ComponentModel.ComponentResourceManager resources = new System.ComponentModel.ComponentResourceManager(typeof(MainForm));\n            this.SuspendLayout();",
        );
        let out = updated_designer(apply_designer_icon(&with_resources, "MainForm"));
        assert_eq!(out.matches("ComponentResourceManager resources").count(), 1);
        let decl = out.find("resources = new").unwrap();
        let icon = out.find("this.Icon =").unwrap();
        let suspend = out.find("this.SuspendLayout").unwrap();
        assert!(decl < icon && icon < suspend);
    }

    #[test]
    fn icon_assigned_in_another_member_does_not_count() {
        let later_member = DESIGNER.replace(
            "        }\n    }\n}\n",
            "        }\n\n        private void ApplyTheme()\n        {\n            \
             System.ComponentModel.ComponentResourceManager resources = \
             new System.ComponentModel.ComponentResourceManager(typeof(Theme));\n            \
             this.Icon = null;\n        }\n    }\n}\n",
        );
        let out = updated_designer(apply_designer_icon(&later_member, "MainForm"));

        let (init, rest) = out.split_once("ApplyTheme").unwrap();
        assert!(init.contains("typeof(MainForm)"));
        assert!(init.contains("resources.GetObject(\"$this.Icon\")"));
        assert!(!rest.contains("GetObject"));
    }

    #[test]
    fn braces_in_strings_and_comments_do_not_end_the_body() {
        let tricky = DESIGNER.replace(
            "            this.Text = \"Demo\";",
            "            this.Text = \"Demo }\"; // closing } here\n            \
             this.Tag = '}';\n            /* } */\n            this.Icon = null;",
        );
        assert_eq!(
            apply_designer_icon(&tricky, "MainForm"),
            DesignerPatch::Unchanged
        );
    }

    #[test]
    fn designer_without_initialize_component_is_rejected() {
        assert_eq!(
            apply_designer_icon("partial class X { }", "X"),
            DesignerPatch::MissingInitializeComponent
        );
    }

    fn project_with_form(dir: &Path, designer: bool) -> ProjectDescriptor {
        let resx = dir.join("MainForm.resx");
        fs::write(&resx, RESX_WITHOUT_ICON).unwrap();
        let designer_path = dir.join("MainForm.Designer.cs");
        if designer {
            fs::write(&designer_path, DESIGNER).unwrap();
        }
        ProjectDescriptor {
            dir: dir.to_path_buf(),
            name: "Demo".into(),
            manifests: vec![dir.join("Demo.csproj")],
            entry_form: Some(EntryForm {
                name: "MainForm".into(),
                resx,
                designer: designer.then_some(designer_path),
            }),
        }
    }

    fn write_icon(dir: &Path) -> PathBuf {
        let icon = dir.join("app.ico");
        fs::write(&icon, [0u8, 0, 1, 0, 1, 0]).unwrap();
        icon
    }

    #[test]
    fn patch_writes_both_files_then_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let project = project_with_form(tmp.path(), true);
        let patcher = ResourcePatcher::new(&write_icon(tmp.path())).unwrap();

        let first = patcher.patch(&project).unwrap();
        assert!(first.resx_changed && first.designer_changed);

        let second = patcher.patch(&project).unwrap();
        assert!(!second.resx_changed && !second.designer_changed);
    }

    #[test]
    fn missing_designer_leaves_resx_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let project = project_with_form(tmp.path(), false);
        let patcher = ResourcePatcher::new(&write_icon(tmp.path())).unwrap();

        let err = patcher.patch(&project).unwrap_err();
        assert!(matches!(err, PatchError::DesignerNotFound { .. }));
        let resx = fs::read_to_string(tmp.path().join("MainForm.resx")).unwrap();
        assert_eq!(resx, RESX_WITHOUT_ICON);
    }

    #[test]
    fn project_without_entry_form_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let patcher = ResourcePatcher::new(&write_icon(tmp.path())).unwrap();
        let project = ProjectDescriptor {
            dir: tmp.path().to_path_buf(),
            name: "Demo".into(),
            manifests: Vec::new(),
            entry_form: None,
        };
        assert!(matches!(
            patcher.patch(&project),
            Err(PatchError::EntryFormNotFound { .. })
        ));
    }

    #[test]
    fn missing_icon_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            ResourcePatcher::new(&tmp.path().join("nope.ico")),
            Err(PatchError::IconNotFound { .. })
        ));
    }
}
