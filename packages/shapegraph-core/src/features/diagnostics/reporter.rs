//! Deduplicating finding sink

use super::finding::{CallSite, Finding, FindingKind, Severity};
use rustc_hash::FxHashSet;

type DedupKey = (FindingKind, crate::shared::models::Location, String, Vec<CallSite>);

/// Collects findings in emission order, dropping exact repeats.
///
/// The same defect is usually found once per heap reaching a program point;
/// only the first occurrence is kept.
#[derive(Debug, Default)]
pub struct Reporter {
    findings: Vec<Finding>,
    seen: FxHashSet<DedupKey>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding; returns false if it was a duplicate
    pub fn report(&mut self, finding: Finding) -> bool {
        let key = (
            finding.kind,
            finding.loc.clone(),
            finding.message.clone(),
            finding.backtrace.clone(),
        );
        if !self.seen.insert(key) {
            return false;
        }
        match finding.severity {
            Severity::Error => tracing::debug!(finding = %finding, "error reported"),
            Severity::Warning => tracing::warn!(finding = %finding, "warning reported"),
            Severity::Note => tracing::debug!(finding = %finding, "note reported"),
        }
        self.findings.push(finding);
        true
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn error_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_error()).count()
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Location;

    #[test]
    fn test_duplicates_are_dropped() {
        let mut reporter = Reporter::new();
        let loc = Location::new("a.c", 3);
        let f = Finding::new(FindingKind::DoubleFree, loc.clone(), "double free");
        assert!(reporter.report(f.clone()));
        assert!(!reporter.report(f.clone()));

        // another call stack is another finding
        let site = CallSite {
            function: "main".into(),
            loc: Location::new("a.c", 9),
        };
        assert!(reporter.report(f.with_backtrace(vec![site])));
        assert_eq!(reporter.count(FindingKind::DoubleFree), 2);
        assert_eq!(reporter.error_count(), 2);
    }

    #[test]
    fn test_display_includes_backtrace() {
        let f = Finding::new(FindingKind::MemoryLeak, Location::new("a.c", 4), "memory leak detected")
            .with_backtrace(vec![CallSite {
                function: "main".into(),
                loc: Location::new("a.c", 10),
            }]);
        assert_eq!(
            f.to_string(),
            "a.c:4: warning: memory leak detected\na.c:10: note: from call of main()"
        );
    }
}
