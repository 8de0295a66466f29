use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;

/// Optional dump of every prompt and raw completion, one file each.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
    seq: AtomicUsize,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self {
            dir,
            enabled,
            seq: AtomicUsize::new(0),
        })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
            seq: AtomicUsize::new(0),
        }
    }

    /// Reserves the next exchange number, shared by its prompt and response files.
    pub fn next_seq(&self) -> usize {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// `<seq>.<strategy>.<section>.<kind>.txt`
    pub fn write_exchange_text(
        &self,
        seq: usize,
        strategy: &str,
        section: &str,
        kind: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = format!("{seq:06}.{strategy}.{section}.{kind}.txt");
        self.write_named_text(&name, text)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_whitespace() => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::TraceWriter;

    #[test]
    fn writes_sanitized_exchange_files_when_enabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let trace = TraceWriter::new(dir.path().join("t"), true).expect("trace");
        let seq = trace.next_seq();
        trace
            .write_exchange_text(seq, "prose", "Problem Analysis/2", "prompt", "hello")
            .expect("write");
        let path = dir.path().join("t/000001.prose.Problem_Analysis_2.prompt.txt");
        assert_eq!(std::fs::read_to_string(path).expect("read"), "hello");
        assert_eq!(trace.next_seq(), 2);
    }

    #[test]
    fn disabled_writer_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let trace = TraceWriter::new(dir.path().join("t"), false).expect("trace");
        trace.write_named_text("x.txt", "y").expect("noop");
        assert!(!dir.path().join("t").exists());
    }
}
