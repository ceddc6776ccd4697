//! Evaluator sessions.
//!
//! The live evaluator is an external program that reads the settings from
//! `settings.json` in its working directory, then answers one request per line
//! on stdin (`"{angle},{stretch}\n"`) with one float per line on stdout until it
//! receives `"end\n"`. [`ProcessOracle`] owns such a process together with a
//! private working directory, so nothing depends on the caller's current
//! directory. [`FnOracle`] evaluates an in-process landscape function instead.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::config::ProcessSettings;
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::traits::{Oracle, OracleFactory};

const SETTINGS_FILE: &str = "settings.json";
const END_SENTINEL: &str = "end";

static SESSION_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Request/response codec for the evaluator's line protocol.
pub struct LineProtocol<W: Write, R: BufRead> {
    writer: W,
    reader: R,
    line: String,
}

impl<W: Write, R: BufRead> LineProtocol<W, R> {
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            line: String::new(),
        }
    }

    pub fn query(&mut self, angle: f64, stretch: f64) -> Result<f64> {
        writeln!(self.writer, "{angle},{stretch}")
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::OracleCommunication(format!("failed to send request: {e}")))?;

        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| Error::OracleCommunication(format!("failed to read response: {e}")))?;
        if read == 0 {
            return Err(Error::OracleCommunication(
                "evaluator closed its output".into(),
            ));
        }
        let text = self.line.trim();
        text.parse::<f64>().map_err(|_| {
            Error::OracleCommunication(format!("unparsable response {text:?}"))
        })
    }

    /// Sends the termination sentinel.
    pub fn finish(&mut self) -> Result<()> {
        writeln!(self.writer, "{END_SENTINEL}")
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::OracleCommunication(format!("failed to send sentinel: {e}")))
    }

    pub fn into_parts(self) -> (W, R) {
        (self.writer, self.reader)
    }
}

type ChildProtocol = LineProtocol<ChildStdin, BufReader<ChildStdout>>;

/// A session backed by one external evaluator process.
pub struct ProcessOracle {
    child: Child,
    protocol: Option<ChildProtocol>,
    work_dir: PathBuf,
    evaluations: usize,
}

impl ProcessOracle {
    /// Writes the settings into a fresh working directory under
    /// `process.working_dir` and starts the evaluator there.
    pub fn open(process: &ProcessSettings, settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let id = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let work_dir = process
            .working_dir
            .join(format!("session-{}-{}", std::process::id(), id));
        fs::create_dir_all(&work_dir)?;
        fs::write(
            work_dir.join(SETTINGS_FILE),
            serde_json::to_string_pretty(settings)?,
        )?;

        let mut child = Command::new(&process.program)
            .args(&process.args)
            .current_dir(&work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let _ = fs::remove_dir_all(&work_dir);
                Error::OracleCommunication(format!(
                    "failed to start evaluator {}: {e}",
                    process.program.display()
                ))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = fs::remove_dir_all(&work_dir);
                return Err(Error::OracleCommunication(
                    "evaluator pipes were not captured".into(),
                ));
            }
        };

        info!(pid = child.id(), work_dir = %work_dir.display(), "opened evaluator session");
        Ok(Self {
            child,
            protocol: Some(LineProtocol::new(stdin, BufReader::new(stdout))),
            work_dir,
            evaluations: 0,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn is_closed(&self) -> bool {
        self.protocol.is_none()
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl Oracle for ProcessOracle {
    fn evaluate(&mut self, angle: f64, stretch: f64) -> Result<f64> {
        let protocol = self.protocol.as_mut().ok_or(Error::SessionClosed)?;
        let value = protocol.query(angle, stretch)?;
        self.evaluations += 1;
        Ok(value)
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut protocol) = self.protocol.take() else {
            return Ok(());
        };
        let sent = protocol.finish();
        // Dropping stdin lets an evaluator that missed the sentinel see EOF.
        drop(protocol);

        let waited = match sent {
            Ok(()) => self.child.wait(),
            Err(err) => {
                warn!(error = %err, "evaluator did not accept the sentinel; killing it");
                let _ = self.child.kill();
                self.child.wait()
            }
        };
        // The directory goes even when the wait failed.
        if let Err(err) = fs::remove_dir_all(&self.work_dir) {
            debug!(error = %err, work_dir = %self.work_dir.display(), "could not remove session directory");
        }
        let status = waited?;
        info!(
            evaluations = self.evaluations,
            status = %status,
            "closed evaluator session"
        );
        Ok(())
    }
}

impl Drop for ProcessOracle {
    fn drop(&mut self) {
        if self.protocol.is_some() {
            if let Err(err) = self.close() {
                warn!(error = %err, "failed to close evaluator session on drop");
            }
        }
    }
}

/// Opens [`ProcessOracle`] sessions for one evaluator program.
#[derive(Debug, Clone)]
pub struct ProcessOracleFactory {
    pub process: ProcessSettings,
}

impl ProcessOracleFactory {
    pub fn new(process: ProcessSettings) -> Self {
        Self { process }
    }
}

impl OracleFactory for ProcessOracleFactory {
    type Session = ProcessOracle;

    fn open(&self, settings: &Settings) -> Result<ProcessOracle> {
        ProcessOracle::open(&self.process, settings)
    }
}

/// A session evaluating an in-process landscape function.
pub struct FnOracle<F> {
    landscape: F,
    closed: bool,
}

impl<F: FnMut(f64, f64) -> f64> FnOracle<F> {
    pub fn new(landscape: F) -> Self {
        Self {
            landscape,
            closed: false,
        }
    }
}

impl<F: FnMut(f64, f64) -> f64> Oracle for FnOracle<F> {
    fn evaluate(&mut self, angle: f64, stretch: f64) -> Result<f64> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok((self.landscape)(angle, stretch))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Opens [`FnOracle`] sessions over a cloneable landscape function.
#[derive(Debug, Clone)]
pub struct FnOracleFactory<F> {
    landscape: F,
}

impl<F: Fn(f64, f64) -> f64 + Clone> FnOracleFactory<F> {
    pub fn new(landscape: F) -> Self {
        Self { landscape }
    }
}

impl<F: Fn(f64, f64) -> f64 + Clone> OracleFactory for FnOracleFactory<F> {
    type Session = FnOracle<F>;

    fn open(&self, settings: &Settings) -> Result<FnOracle<F>> {
        settings.validate()?;
        Ok(FnOracle::new(self.landscape.clone()))
    }
}

/// Runs `body` against a freshly opened session and closes the session on
/// every exit path. An error from `body` wins over an error from closing.
pub fn with_session<Fac, T, B>(factory: &Fac, settings: &Settings, body: B) -> Result<T>
where
    Fac: OracleFactory,
    B: FnOnce(&mut Fac::Session) -> Result<T>,
{
    let mut session = factory.open(settings)?;
    match body(&mut session) {
        Ok(value) => {
            session.close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = session.close() {
                warn!(error = %close_err, "failed to release session after error");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::fixtures::sample_settings;
    use std::cell::Cell;
    use std::io::Cursor;

    #[test]
    fn line_protocol_round_trip() {
        let responses = Cursor::new(b"12.5\n-3\n".to_vec());
        let mut protocol = LineProtocol::new(Vec::new(), responses);
        assert_eq!(protocol.query(45.0, 1.5).expect("first"), 12.5);
        assert_eq!(protocol.query(-10.25, 0.0).expect("second"), -3.0);
        protocol.finish().expect("sentinel");
        let (written, _) = protocol.into_parts();
        assert_eq!(
            String::from_utf8(written).expect("utf8"),
            "45,1.5\n-10.25,0\nend\n"
        );
    }

    #[test]
    fn line_protocol_reports_bad_output() {
        let mut protocol = LineProtocol::new(Vec::new(), Cursor::new(b"oops\n".to_vec()));
        assert!(matches!(
            protocol.query(1.0, 1.0),
            Err(Error::OracleCommunication(msg)) if msg.contains("oops")
        ));

        let mut protocol = LineProtocol::new(Vec::new(), Cursor::new(Vec::new()));
        assert!(matches!(
            protocol.query(1.0, 1.0),
            Err(Error::OracleCommunication(msg)) if msg.contains("closed")
        ));
    }

    #[test]
    fn fn_oracle_fails_fast_after_close() {
        let mut oracle = FnOracle::new(|a, s| a + s);
        assert_eq!(oracle.evaluate(1.0, 2.0).expect("open"), 3.0);
        oracle.close().expect("close");
        oracle.close().expect("second close is harmless");
        assert!(matches!(oracle.evaluate(1.0, 2.0), Err(Error::SessionClosed)));
    }

    #[test]
    fn with_session_closes_on_error() {
        struct Probe<'a> {
            closes: &'a Cell<usize>,
        }
        impl Oracle for Probe<'_> {
            fn evaluate(&mut self, _: f64, _: f64) -> Result<f64> {
                Err(Error::OracleCommunication("boom".into()))
            }
            fn close(&mut self) -> Result<()> {
                self.closes.set(self.closes.get() + 1);
                Ok(())
            }
        }
        struct ProbeFactory<'a> {
            closes: &'a Cell<usize>,
        }
        impl<'a> OracleFactory for ProbeFactory<'a> {
            type Session = Probe<'a>;
            fn open(&self, _: &Settings) -> Result<Probe<'a>> {
                Ok(Probe {
                    closes: self.closes,
                })
            }
        }

        let closes = Cell::new(0);
        let factory = ProbeFactory { closes: &closes };
        let result = with_session(&factory, &sample_settings(), |oracle| {
            oracle.evaluate(0.0, 0.0)
        });
        assert!(matches!(result, Err(Error::OracleCommunication(_))));
        assert_eq!(closes.get(), 1);

        let value = with_session(&factory, &sample_settings(), |_| Ok(7)).expect("ok body");
        assert_eq!(value, 7);
        assert_eq!(closes.get(), 2);
    }

    #[test]
    fn factory_rejects_invalid_settings() {
        let factory = FnOracleFactory::new(|a: f64, s: f64| a * s);
        assert!(matches!(
            factory.open(&Settings::default()),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[cfg(unix)]
    fn shell_evaluator(dir: &Path, script: &str) -> ProcessSettings {
        ProcessSettings {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), script.into()],
            working_dir: dir.to_path_buf(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn process_oracle_speaks_line_protocol() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Echo back the angle; stop on the sentinel. Requires settings.json in cwd.
        let script = r#"test -f settings.json || exit 3
while IFS=, read a s; do
  [ "$a" = "end" ] && exit 0
  echo "$a"
done"#;
        let process = shell_evaluator(dir.path(), script);
        let mut oracle = ProcessOracle::open(&process, &sample_settings()).expect("spawn");
        let work_dir = oracle.work_dir().to_path_buf();
        assert!(work_dir.join(SETTINGS_FILE).exists());

        assert_eq!(oracle.evaluate(12.5, 3.0).expect("query"), 12.5);
        assert_eq!(oracle.evaluate(-4.0, 1.0).expect("query"), -4.0);
        assert_eq!(oracle.evaluations(), 2);

        oracle.close().expect("close");
        assert!(oracle.is_closed());
        assert!(!work_dir.exists());
        assert!(matches!(oracle.evaluate(1.0, 1.0), Err(Error::SessionClosed)));
        oracle.close().expect("close is idempotent");
    }

    #[cfg(unix)]
    #[test]
    fn process_oracle_reports_dead_evaluator() {
        let dir = tempfile::tempdir().expect("tempdir");
        let process = shell_evaluator(dir.path(), "exit 0");
        let mut oracle = ProcessOracle::open(&process, &sample_settings()).expect("spawn");
        let work_dir = oracle.work_dir().to_path_buf();
        assert!(matches!(
            oracle.evaluate(1.0, 1.0),
            Err(Error::OracleCommunication(_))
        ));
        // Close still succeeds even though the evaluator is gone.
        oracle.close().expect("best-effort close");
        assert!(!work_dir.exists());
    }

    #[test]
    fn process_oracle_reports_missing_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let process = ProcessSettings {
            program: dir.path().join("no-such-evaluator"),
            args: Vec::new(),
            working_dir: dir.path().to_path_buf(),
        };
        assert!(matches!(
            ProcessOracle::open(&process, &sample_settings()),
            Err(Error::OracleCommunication(msg)) if msg.contains("failed to start")
        ));
    }
}
