use crate::engine::{AuthorCompliance, ComplianceEntry, ComplianceReport, ScoreResult};
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Order results by descending score. The sort is stable, so equal scores
/// keep the original author iteration order.
pub fn rank(mut results: Vec<ScoreResult>) -> Vec<ScoreResult> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results
}

pub fn entry_line(index: usize, entry: &ComplianceEntry, beneficiary: Option<&str>) -> String {
    let reference = format!(
        "['{}'](https://peakd.com/@{}/{})",
        entry.title, entry.author, entry.permlink
    );
    match beneficiary {
        Some(account) => {
            let credited = match entry.beneficiary_percent {
                Some(percent) => format!("yes for {percent}%"),
                None => "no".to_string(),
            };
            format!(
                "{index}) {} published {reference} ---> {account} as beneficiary? {credited}",
                entry.author
            )
        }
        None => format!("{index}) {} published {reference}", entry.author),
    }
}

pub fn author_line(author: &AuthorCompliance) -> String {
    let cross = if author.has_cross_author_reply { "yes" } else { "no" };
    format!(
        "- **{}** made **{} comments** (cross-author reply: {cross}) and voted in **{} polls**",
        author.author, author.comments, author.polls_voted
    )
}

/// Write the ranked score lines to a flat file, one per author.
pub fn write_scores(results: &[ScoreResult], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating score report {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for result in results {
        writeln!(out, "{}", result.line)?;
    }
    out.flush().context("flushing score report")?;
    Ok(())
}

/// Write the two compliance artifacts: one line per eligible post, and one
/// summary line per author sorted lexicographically.
pub fn write_compliance(
    report: &ComplianceReport,
    beneficiary: Option<&str>,
    entries_path: &Path,
    authors_path: &Path,
) -> Result<()> {
    let entries_file = File::create(entries_path)
        .with_context(|| format!("creating {}", entries_path.display()))?;
    let mut out = BufWriter::new(entries_file);
    for (i, entry) in report.entries.iter().enumerate() {
        writeln!(out, "{}", entry_line(i + 1, entry, beneficiary))?;
    }
    out.flush().context("flushing entries report")?;

    let mut lines: Vec<String> = report.authors.iter().map(author_line).collect();
    lines.sort();
    let authors_file = File::create(authors_path)
        .with_context(|| format!("creating {}", authors_path.display()))?;
    let mut out = BufWriter::new(authors_file);
    for line in &lines {
        writeln!(out, "{line}")?;
    }
    out.flush().context("flushing authors report")?;
    Ok(())
}
