// FormSnap - app/prompt.rs
//
// Interactive prompts for run mode and target path, used when they are not
// given on the command line. Generic over the reader/writer so tests can
// script the input.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Single project or a batch over a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    Single,
    Batch,
}

/// Ask for the run mode. "2" (or "batch") selects batch; anything else,
/// including an empty line, selects single-project mode.
pub fn prompt_mode<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<RunMode> {
    write!(
        output,
        "Choose mode:\n  1 - Single project\n  2 - Batch process all projects in a directory\nEnter choice (1 or 2): "
    )?;
    output.flush()?;

    let line = read_line(input)?;
    let mode = match line.trim().to_ascii_lowercase().as_str() {
        "2" | "batch" => RunMode::Batch,
        _ => RunMode::Single,
    };
    tracing::debug!(?mode, "Run mode chosen");
    Ok(mode)
}

/// Ask for the project or root directory.
pub fn prompt_path<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    mode: RunMode,
) -> io::Result<PathBuf> {
    let question = match mode {
        RunMode::Single => "Enter the full path to your project directory: ",
        RunMode::Batch => "Enter the main directory path: ",
    };
    write!(output, "{question}")?;
    output.flush()?;

    Ok(PathBuf::from(clean_path_input(&read_line(input)?)))
}

/// Strip surrounding whitespace and one layer of matching quotes, as left
/// behind by "Copy as path" or drag-and-drop into a terminal.
pub fn clean_path_input(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}

fn read_line<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before an answer was given",
        ));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn two_selects_batch() {
        let mut out = Vec::new();
        let mode = prompt_mode(&mut Cursor::new("2\n"), &mut out).unwrap();
        assert_eq!(mode, RunMode::Batch);
        assert!(String::from_utf8(out).unwrap().contains("Enter choice"));
    }

    #[test]
    fn anything_else_selects_single() {
        for answer in ["1\n", "\n", "x\n"] {
            let mode = prompt_mode(&mut Cursor::new(answer), &mut Vec::new()).unwrap();
            assert_eq!(mode, RunMode::Single, "answer {answer:?}");
        }
    }

    #[test]
    fn closed_input_is_an_error() {
        let err = prompt_mode(&mut Cursor::new(""), &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn path_quotes_and_whitespace_are_trimmed() {
        let path = prompt_path(
            &mut Cursor::new("  \"C:\\Samples\\CS\\Barcode Demo\"  \r\n"),
            &mut Vec::new(),
            RunMode::Single,
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("C:\\Samples\\CS\\Barcode Demo"));
    }

    #[test]
    fn single_quotes_are_trimmed() {
        assert_eq!(clean_path_input("'/srv/samples'\n"), "/srv/samples");
    }
}
