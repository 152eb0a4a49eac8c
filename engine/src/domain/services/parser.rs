//! Control-file parser
//! Line-oriented declarative grammar: `check`, `set` and `include`
//! directives, with per-check attributes scanned out of each check block.
//! Parsed items are emitted to a `ConfigWalker`; the parser itself never
//! touches live state.

use crate::domain::entities::{unquote, Check, ProcessCheck, Program, ServiceCheck};
use crate::domain::ports::ConfigWalker;
use crate::domain::value_objects::parse_with_timeout;
use crate::domain::{Error, Result};
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ConfigParser;

impl ConfigParser {
    /// Parses `path` and feeds the results to `walker`. Only the primary
    /// control file is permission-checked by the caller; included files are
    /// read as-is (matching historical behavior).
    pub fn parse_file(path: &Path, walker: &mut dyn ConfigWalker) -> Result<()> {
        debug!(file = %path.display(), "Parsing file");
        let data = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => Error::NotReadable(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Error::ControlFileMissing(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::parse(&data, walker)
    }

    pub fn parse(config: &str, walker: &mut dyn ConfigWalker) -> Result<()> {
        let cleaned = clean_lines(config);
        for (directive, content) in split_directives(&cleaned) {
            match directive.as_str() {
                "include" => Self::parse_include(&content, walker)?,
                "check" => Self::parse_check(&content, walker)?,
                "set" => Self::parse_set(&content, walker),
                other => debug!(directive = other, "Ignoring directive"),
            }
        }
        Ok(())
    }

    fn parse_include(content: &str, walker: &mut dyn ConfigWalker) -> Result<()> {
        let pattern = content.lines().next().unwrap_or("").trim();
        let matches = glob::glob(pattern).map_err(|e| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        for entry in matches {
            match entry {
                Ok(path) => {
                    if let Err(e) = Self::parse_file(&path, walker) {
                        warn!(file = %path.display(), error = %e, "Skipping included file");
                    }
                }
                Err(e) => warn!(error = %e, "Unreadable include match"),
            }
        }
        Ok(())
    }

    fn parse_check(content: &str, walker: &mut dyn ConfigWalker) -> Result<()> {
        let decl_re =
            Regex::new(r"(?s)^\s*(\S+)\s+(\S+)(.*)$").expect("check declaration pattern");
        let caps = decl_re.captures(content).ok_or(Error::UnparsableCheck)?;
        let kind = &caps[1];
        let id = &caps[2];
        let attrs = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        let check = match kind {
            "process" => {
                let mut check = ProcessCheck::new(id);
                parse_process_attrs(&mut check, attrs);
                Check::Process(check)
            }
            other => {
                warn!(kind = other, check = id, "Unsupported check kind, registering bare check");
                Check::Service(ServiceCheck::new(id, other))
            }
        };
        walker.add_check(check)
    }

    fn parse_set(content: &str, walker: &mut dyn ConfigWalker) {
        let ns_re = Regex::new(
            r"(?s)^\s*(daemon|ssl|tls|httpd|alert|mail-format|mailserver|eventqueue|limits)\s+(.*)$",
        )
        .expect("set namespace pattern");
        if let Some(caps) = ns_re.captures(content) {
            let namespace = caps[1].to_string();
            let mut attrs = std::collections::HashMap::new();
            let pair_re = Regex::new(r"(?s)^\s*(\S+)\s+(\S+)(.*)$").expect("set pair pattern");
            let mut rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            while let Some(pair) = pair_re.captures(rest) {
                attrs.insert(pair[1].to_string(), pair[2].to_string());
                let end = pair.get(3).map(|m| m.start()).unwrap_or(rest.len());
                rest = &rest[end..];
            }
            walker.set_namespaced_config(&namespace, &attrs);
            return;
        }

        let var_re = Regex::new(r"(?s)^\s*(\S+)\s*(.*)$").expect("set variable pattern");
        if let Some(caps) = var_re.captures(content) {
            walker.set_attribute(caps[1].trim(), caps[2].trim());
        }
    }
}

/// Drops full-line comments and truncates lines at the first `#` outside
/// double quotes.
fn clean_lines(data: &str) -> String {
    let mut result = Vec::new();
    for line in data.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        result.push(strip_trailing_comment(line));
    }
    result.join("\n")
}

fn strip_trailing_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// Splits the cleaned text into directive blocks. A line whose first token is
/// `check`, `set` or `include` starts a block; everything until the next
/// directive belongs to it. Content before the first directive is ignored.
fn split_directives(data: &str) -> Vec<(String, String)> {
    let mut blocks: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, String)> = None;
    for line in data.lines() {
        let trimmed = line.trim_start();
        match trimmed.split_whitespace().next() {
            Some(word @ ("check" | "set" | "include")) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some((word.to_string(), trimmed[word.len()..].to_string()));
            }
            _ => match current.as_mut() {
                Some((_, content)) => {
                    content.push('\n');
                    content.push_str(line);
                }
                None if !trimmed.is_empty() => {
                    debug!(line = trimmed, "Ignoring content outside directives");
                }
                None => {}
            },
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    blocks
}

/// Scans the attribute blob of a `check process` declaration.
fn parse_process_attrs(check: &mut ProcessCheck, data: &str) {
    const GROUP: &str = r#"group\s+(\S+)"#;
    const START: &str = r#"start\s+program\s+=\s+("[^"]+"|\S+)([^\n]*)"#;
    const STOP: &str = r#"stop\s+program\s+=\s+("[^"]+"|\S+)([^\n]*)"#;
    const IF: &str = r"if\s+[^\n]+";
    const TIMEOUT: &str = r"with\s+timeout\s+\S+\s+\S+";
    const WITH: &str = r"with\s+(\S+)\s+(\S+)";

    let statement_re = Regex::new(&format!(
        r"(?s)^\s*({GROUP}|{START}|{STOP}|{IF}|{TIMEOUT}|{WITH})"
    ))
    .expect("attribute statement pattern");
    let group_re = Regex::new(GROUP).expect("group pattern");
    let start_re = Regex::new(START).expect("start pattern");
    let stop_re = Regex::new(STOP).expect("stop pattern");
    let timeout_re = Regex::new(TIMEOUT).expect("timeout pattern");
    let with_re = Regex::new(WITH).expect("with pattern");

    let mut rest = data;
    loop {
        let caps = match statement_re.captures(rest) {
            Some(caps) => caps,
            None => break,
        };
        let statement = caps.get(1).expect("statement group").as_str().trim().to_string();
        rest = &rest[caps.get(0).expect("whole match").end()..];

        if statement.starts_with("if") {
            // condition clauses are recognised but not acted on
            debug!(statement = %statement, "Ignoring statement");
        } else if let Some(m) = group_re.captures(&statement) {
            check.set_group(unquote(&m[1]));
        } else if let Some(m) = start_re.captures(&statement) {
            check.set_start_program(parse_program(&m[1], m.get(2).map_or("", |t| t.as_str())));
        } else if let Some(m) = stop_re.captures(&statement) {
            check.set_stop_program(parse_program(&m[1], m.get(2).map_or("", |t| t.as_str())));
        } else if timeout_re.is_match(&statement) {
            match parse_with_timeout(&statement) {
                Ok(Some(timeout)) => check.set_timeout(timeout),
                Ok(None) => warn!(statement = %statement, "Unknown timeout unit"),
                Err(e) => warn!(statement = %statement, "{}", e),
            }
        } else if let Some(m) = with_re.captures(&statement) {
            if &m[1] == "pidfile" {
                check.set_pid_file(unquote(&m[2]));
            } else {
                warn!("Don't know how to interpret \"with {}\"", &m[1]);
            }
        } else {
            debug!(statement = %statement, "Ignoring statement");
        }
    }
}

fn parse_program(cmd: &str, tail: &str) -> Program {
    let timeout = match parse_with_timeout(tail) {
        Ok(Some(timeout)) => timeout,
        Ok(None) => Duration::ZERO,
        Err(e) => {
            warn!(tail = tail, "{}", e);
            Duration::ZERO
        }
    };
    Program::new(cmd, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingWalker {
        checks: Vec<Check>,
        namespaced: Vec<(String, HashMap<String, String>)>,
        attributes: Vec<(String, String)>,
    }

    impl ConfigWalker for RecordingWalker {
        fn add_check(&mut self, check: Check) -> Result<()> {
            self.checks.push(check);
            Ok(())
        }

        fn set_namespaced_config(&mut self, namespace: &str, attrs: &HashMap<String, String>) {
            self.namespaced.push((namespace.to_string(), attrs.clone()));
        }

        fn set_attribute(&mut self, key: &str, value: &str) {
            self.attributes.push((key.to_string(), value.to_string()));
        }
    }

    const SAMPLE: &str = r#"
# primary services
set httpd unixsocket /tmp/warden-test.sock
check process apache with pidfile /tmp/apache.pid
  group web
  start program = "/opt/apache/ctl start" with timeout 60 seconds
  stop program = "/opt/apache/ctl stop"   # graceful
check process mysql with pidfile "/tmp/mysql.pid"
  with timeout 3 minutes
  start program = "/opt/mysql/ctl start"
  stop program = "/opt/mysql/ctl stop"
set logrotation weekly
"#;

    #[test]
    fn parses_checks_with_attributes() {
        let mut walker = RecordingWalker::default();
        ConfigParser::parse(SAMPLE, &mut walker).unwrap();

        assert_eq!(walker.checks.len(), 2);
        let apache = walker.checks[0].as_process().unwrap();
        assert_eq!(walker.checks[0].id(), "apache");
        assert_eq!(apache.group(), Some("web"));
        assert_eq!(apache.pid_file(), Path::new("/tmp/apache.pid"));

        let mysql = walker.checks[1].as_process().unwrap();
        assert_eq!(mysql.pid_file(), Path::new("/tmp/mysql.pid"));
        assert_eq!(walker.checks[1].timeout(), Duration::from_secs(180));
    }

    #[test]
    fn program_timeouts_and_quoting() {
        let mut walker = RecordingWalker::default();
        ConfigParser::parse(SAMPLE, &mut walker).unwrap();

        let apache = walker.checks[0].as_process().unwrap();
        assert_eq!(apache.start_program().cmd(), "/opt/apache/ctl start");
        assert_eq!(apache.start_program().timeout(), Duration::from_secs(60));
        // no per-command timeout: resolved to the check timeout at initialize
        assert_eq!(apache.stop_program().cmd(), "/opt/apache/ctl stop");
        assert_eq!(apache.stop_program().timeout(), Duration::ZERO);
    }

    #[test]
    fn namespaced_and_plain_set() {
        let mut walker = RecordingWalker::default();
        ConfigParser::parse(SAMPLE, &mut walker).unwrap();

        assert_eq!(walker.namespaced.len(), 1);
        let (ns, attrs) = &walker.namespaced[0];
        assert_eq!(ns, "httpd");
        assert_eq!(attrs.get("unixsocket").map(String::as_str), Some("/tmp/warden-test.sock"));

        assert_eq!(
            walker.attributes,
            vec![("logrotation".to_string(), "weekly".to_string())]
        );
    }

    #[test]
    fn comments_are_stripped_outside_quotes() {
        let config = "check process svc with pidfile /tmp/s.pid\n  start program = \"echo '#not a comment'\" # real comment\n";
        let mut walker = RecordingWalker::default();
        ConfigParser::parse(config, &mut walker).unwrap();
        assert_eq!(walker.checks.len(), 1);
        let process = walker.checks[0].as_process().unwrap();
        assert_eq!(process.pid_file(), Path::new("/tmp/s.pid"));
        assert_eq!(process.start_program().cmd(), "echo '#not a comment'");
    }

    #[test]
    fn unknown_kind_registers_bare_check() {
        let mut walker = RecordingWalker::default();
        ConfigParser::parse("check host gateway with pidfile /x\n", &mut walker).unwrap();
        assert_eq!(walker.checks.len(), 1);
        assert_eq!(walker.checks[0].kind(), "host");
        assert!(walker.checks[0].as_process().is_none());
    }

    #[test]
    fn bare_check_directive_is_an_error() {
        let mut walker = RecordingWalker::default();
        assert!(matches!(
            ConfigParser::parse("check process\n", &mut walker),
            Err(Error::UnparsableCheck)
        ));
    }

    #[test]
    fn includes_resolve_globs() {
        let dir = TempDir::new().unwrap();
        for (name, id) in [("a.conf", "alpha"), ("b.conf", "beta")] {
            std::fs::write(
                dir.path().join(name),
                format!("check process {} with pidfile /tmp/{}.pid\n", id, id),
            )
            .unwrap();
        }
        let main = format!("include {}/*.conf\n", dir.path().display());
        let mut walker = RecordingWalker::default();
        ConfigParser::parse(&main, &mut walker).unwrap();
        let mut ids: Vec<&str> = walker.checks.iter().map(|c| c.id()).collect();
        ids.sort();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn check_level_timeout_clause() {
        let config = "check process svc with pidfile /tmp/s.pid\n  with timeout 30 seconds\n";
        let mut walker = RecordingWalker::default();
        ConfigParser::parse(config, &mut walker).unwrap();
        assert_eq!(walker.checks[0].timeout(), Duration::from_secs(30));
    }
}
