use crate::error::EngineError;
use crate::report::Reporter;
use crate::statement::ToolInvocation;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{Sender, channel};
use std::thread;

/// Splits an argument string on whitespace. Single or double quotes group
/// words and are removed; a backslash escapes the next character inside
/// double quotes.
pub fn split_arguments(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('"'), '\\') => match chars.peek() {
                Some(&next) if next == '"' || next == '\\' => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        args.push(current);
    }
    args
}

fn forward_lines(stream: impl Read + Send + 'static, tx: Sender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if tx.send(line.trim_end_matches(['\r', '\n']).to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Runs a tool to completion in `root`. Both output streams are forwarded
/// line by line to the reporter as they arrive.
pub fn run_tool(invocation: &ToolInvocation, root: &Path, reporter: &mut Reporter) -> Result<(), EngineError> {
    let tool_name = invocation.tool.display().to_string();
    let args = split_arguments(&invocation.arguments);
    reporter.line(&format!("{} {}", tool_name, invocation.arguments));
    tracing::debug!(tool = %tool_name, ?args, "launching");

    let mut child = Command::new(&invocation.tool)
        .args(&args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| EngineError::Launch {
            tool: tool_name.clone(),
            source,
        })?;

    let (tx, rx) = channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    for line in rx {
        reporter.line(&line);
    }
    for reader in readers {
        let _ = reader.join();
    }

    let status = child
        .wait()
        .map_err(|e| EngineError::io(format!("wait for '{}'", tool_name), e))?;
    if status.success() {
        Ok(())
    } else {
        Err(EngineError::Tool {
            tool: tool_name,
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_arguments() {
        assert_eq!(split_arguments("-c  a.c\t-o a.o"), vec!["-c", "a.c", "-o", "a.o"]);
        assert!(split_arguments("   ").is_empty());
    }

    #[test]
    fn test_split_quoted_arguments() {
        assert_eq!(
            split_arguments(r#"-DNAME="my app" 'single quoted' "" x"#),
            vec!["-DNAME=my app", "single quoted", "", "x"]
        );
        assert_eq!(split_arguments(r#""a \"b\" c\d""#), vec![r#"a "b" c\d"#]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_reports_exit_code() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut reporter = Reporter::new("test").quiet();
        let ok = ToolInvocation {
            tool: "/bin/sh".into(),
            arguments: "-c 'echo hello; echo oops 1>&2'".into(),
            dependencies: vec![],
        };
        run_tool(&ok, tmp.path(), &mut reporter).unwrap();

        let failing = ToolInvocation {
            tool: "/bin/sh".into(),
            arguments: "-c 'exit 3'".into(),
            dependencies: vec![],
        };
        let err = run_tool(&failing, tmp.path(), &mut reporter).unwrap_err();
        assert!(matches!(err, EngineError::Tool { code: Some(3), .. }));
    }

    #[test]
    fn test_missing_tool_is_a_launch_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut reporter = Reporter::new("test").quiet();
        let missing = ToolInvocation {
            tool: tmp.path().join("no-such-tool"),
            arguments: String::new(),
            dependencies: vec![],
        };
        assert!(matches!(
            run_tool(&missing, tmp.path(), &mut reporter),
            Err(EngineError::Launch { .. })
        ));
    }
}
