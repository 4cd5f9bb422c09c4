//! Byte-stream transforms: the pointer and expansion operations.
//!
//! A transform consumes an input stream completely and writes its result to an
//! output stream. The archive engines only see the [`Transform`] trait; the
//! command line wires in a [`CommandTransform`], tests usually pass closures.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use tracing::instrument;

pub trait Transform {
    /// Read `input` to the end and write the transformed bytes to `output`.
    fn apply(&mut self, input: &mut (dyn Read + Send), output: &mut dyn Write) -> Result<()>;
}

impl<F> Transform for F
where
    F: FnMut(&mut (dyn Read + Send), &mut dyn Write) -> io::Result<()>,
{
    fn apply(&mut self, input: &mut (dyn Read + Send), output: &mut dyn Write) -> Result<()> {
        self(input, output).or_raise(|| ErrorKind::Transform)
    }
}

/// Runs an external program once per invocation, feeding the input on its
/// stdin and taking the output from its stdout. The program's stderr is
/// passed through to ours.
#[derive(Clone, Debug)]
pub struct CommandTransform {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandTransform {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Build from a full command line, program first. Returns `None` if
    /// `argv` is empty.
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next()?;
        Some(Self { program, args: argv.collect() })
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Transform for CommandTransform {
    #[instrument(level = "trace", skip_all, fields(program = %self.program.to_string_lossy()))]
    fn apply(&mut self, input: &mut (dyn Read + Send), output: &mut dyn Write) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .or_raise(|| ErrorKind::Spawn(self.name()))?;
        let mut stdin = child.stdin.take().ok_or_raise(|| ErrorKind::Spawn(self.name()))?;
        let mut stdout = child.stdout.take().ok_or_raise(|| ErrorKind::Spawn(self.name()))?;

        // Stdin is fed from a second thread so that a program producing output
        // before it has read all of its input can't deadlock against us.
        let (fed, drained) = thread::scope(|scope| {
            let feeder = scope.spawn(move || {
                let fed = io::copy(input, &mut stdin);
                drop(stdin);
                match fed {
                    // The program is allowed to stop reading early.
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other.map(|_| ()),
                }
            });
            let drained = io::copy(&mut stdout, output);
            if drained.is_err() {
                // Nobody is reading its output any more; unblock the feeder.
                _ = child.kill();
            }
            drop(stdout);
            (feeder.join(), drained)
        });
        let fed = fed.unwrap_or_else(|payload| std::panic::resume_unwind(payload));

        let status = child.wait().or_raise(|| ErrorKind::Spawn(self.name()))?;
        drained.or_raise(|| ErrorKind::Stream)?;
        if !status.success() {
            exn::bail!(ErrorKind::TransformFailed { program: self.name(), status });
        }
        fed.or_raise(|| ErrorKind::Stream)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(transform: &mut impl Transform, input: &[u8]) -> Result<Vec<u8>> {
        let mut input = input;
        let mut output = Vec::new();
        transform.apply(&mut input, &mut output)?;
        Ok(output)
    }

    #[test]
    fn test_closure_transform() {
        let mut upper = |input: &mut (dyn Read + Send), output: &mut dyn Write| -> io::Result<()> {
            let mut buf = String::new();
            input.read_to_string(&mut buf)?;
            output.write_all(buf.to_uppercase().as_bytes())
        };
        assert_eq!(run(&mut upper, b"pointer").unwrap(), b"POINTER");
    }

    #[test]
    fn test_closure_errors_are_transform_errors() {
        let mut broken = |_: &mut (dyn Read + Send), _: &mut dyn Write| -> io::Result<()> { Err(io::Error::other("nope")) };
        let err = run(&mut broken, b"").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transform));
    }

    #[test]
    fn test_from_argv() {
        assert!(CommandTransform::from_argv(Vec::<String>::new()).is_none());
        let transform = CommandTransform::from_argv(["gzip", "-c", "-9"]).unwrap();
        assert_eq!(transform.program, "gzip");
        assert_eq!(transform.args, ["-c", "-9"]);
    }

    #[test]
    fn test_command_round_trip() {
        let mut cat = CommandTransform::new("cat");
        let input = vec![7u8; 256 * 1024];
        assert_eq!(run(&mut cat, &input).unwrap(), input);
    }

    #[test]
    fn test_command_args() {
        let mut transform = CommandTransform::new("sh").arg("-c").arg("wc -c | tr -d ' '");
        assert_eq!(run(&mut transform, b"12345").unwrap(), b"5\n");
    }

    #[test]
    fn test_command_may_ignore_input() {
        let mut transform = CommandTransform::new("sh").arg("-c").arg("printf fixed");
        let input = vec![0u8; 4 * 1024 * 1024];
        assert_eq!(run(&mut transform, &input).unwrap(), b"fixed");
    }

    #[test]
    fn test_command_failure() {
        let mut transform = CommandTransform::new("sh").arg("-c").arg("cat >/dev/null; exit 3");
        let err = run(&mut transform, b"data").unwrap_err();
        match &*err {
            ErrorKind::TransformFailed { program, status } => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_false_fails() {
        let err = run(&mut CommandTransform::new("false"), b"").unwrap_err();
        assert!(matches!(&*err, ErrorKind::TransformFailed { status, .. } if !status.success()));
    }

    #[test]
    fn test_missing_program() {
        let mut transform = CommandTransform::new("/nonexistent/ptrtar-transform");
        let err = run(&mut transform, b"data").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Spawn(name) if name == "/nonexistent/ptrtar-transform"));
    }
}
