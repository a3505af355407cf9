/// Outcome of a single shutdown step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Full shutdown report. `all_ok()` drives the process exit code.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub steps: Vec<StepOutcome>,
}

impl ShutdownReport {
    pub fn record(&mut self, name: &'static str, ok: bool, detail: impl Into<String>) {
        self.steps.push(StepOutcome {
            name,
            ok,
            detail: detail.into(),
        });
    }

    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

impl std::fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "shutdown report:")?;
        for step in &self.steps {
            writeln!(f, "- [{}] {}: {}", if step.ok { "ok" } else { "FAILED" }, step.name, step.detail)?;
        }
        Ok(())
    }
}
