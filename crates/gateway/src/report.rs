//! HTML evaluation report.
//!
//! Self-contained single file: transcript, coding outcomes, warning
//! thumbnails (links into snapshot storage), and the AI summary.

use candor_domain::session::{
    CodingSubmission, DimensionScores, ProctoringSummary, SessionSnapshot, TurnRole,
};

/// Minimal HTML escaping for untrusted text.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn build_report(
    candidate_name: &str,
    snapshot: &SessionSnapshot,
    coding: Option<&CodingSubmission>,
    overall: f32,
    dims: &DimensionScores,
    proctoring: &ProctoringSummary,
    summary: &str,
) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!doctype html><html><head><meta charset=\"utf-8\">");
    html.push_str("<title>Interview Report</title><style>");
    html.push_str(
        "body{font-family:sans-serif;max-width:860px;margin:2rem auto;padding:0 1rem}\
         table{border-collapse:collapse;width:100%}td,th{border:1px solid #ccc;\
         padding:4px 8px;text-align:left}.interviewer{color:#1a4f8a}\
         .candidate{color:#14632d}.system{color:#777;font-style:italic}\
         .score{font-size:2rem;font-weight:bold}",
    );
    html.push_str("</style></head><body>");

    // ── Header ───────────────────────────────────────────────────
    html.push_str(&format!(
        "<h1>Interview Report — {}</h1>\
         <p class=\"score\">{overall:.1} / 10</p>\
         <table><tr><th>Technical</th><th>Communication</th><th>Problem solving</th>\
         <th>Proctoring penalty</th></tr>\
         <tr><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td><td>-{:.1}</td></tr></table>",
        escape(candidate_name),
        dims.technical,
        dims.communication,
        dims.problem_solving,
        proctoring.penalty,
    ));

    // ── Summary ──────────────────────────────────────────────────
    if !summary.is_empty() {
        html.push_str(&format!("<h2>Summary</h2><p>{}</p>", escape(summary)));
    }

    // ── Transcript ───────────────────────────────────────────────
    html.push_str("<h2>Transcript</h2>");
    for turn in &snapshot.turns {
        let class = match turn.role {
            TurnRole::Interviewer => "interviewer",
            TurnRole::Candidate => "candidate",
            TurnRole::System => "system",
        };
        html.push_str(&format!(
            "<p class=\"{class}\"><strong>#{} {:?}:</strong> {}</p>",
            turn.sequence,
            turn.role,
            escape(&turn.text)
        ));
    }

    // ── Coding round ─────────────────────────────────────────────
    if let Some(coding) = coding {
        let passed = coding.run_results.iter().filter(|r| r.passed).count();
        html.push_str(&format!(
            "<h2>Coding Round — {} ({passed}/{} tests, combined {})</h2>",
            escape(&coding.language),
            coding.run_results.len(),
            coding.combined_score,
        ));
        html.push_str("<table><tr><th>Test</th><th>Passed</th><th>Runtime</th></tr>");
        for r in &coding.run_results {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{} ms</td></tr>",
                escape(&r.test_id),
                if r.passed { "yes" } else { "no" },
                r.runtime_ms
            ));
        }
        html.push_str("</table>");
        html.push_str(&format!(
            "<h3>Review</h3><p>{}</p><pre>{}</pre>",
            escape(&coding.feedback_text),
            escape(&coding.source)
        ));
    }

    // ── Proctoring ───────────────────────────────────────────────
    html.push_str(&format!(
        "<h2>Proctoring ({} warnings)</h2>",
        proctoring.warning_count
    ));
    if snapshot.warnings.is_empty() {
        html.push_str("<p>No warnings recorded.</p>");
    } else {
        html.push_str("<table><tr><th>Kind</th><th>At</th><th>Snapshot</th></tr>");
        for w in &snapshot.warnings {
            let snap_cell = match &w.snapshot_ref {
                Some(r) => format!(
                    "<a href=\"../{r}\"><img src=\"../{r}\" width=\"120\" alt=\"{}\"></a>",
                    escape(w.kind.label())
                ),
                None => "—".to_string(),
            };
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{snap_cell}</td></tr>",
                escape(w.kind.label()),
                w.at.format("%H:%M:%S"),
            ));
        }
        html.push_str("</table>");
    }

    html.push_str("</body></html>");
    html
}
