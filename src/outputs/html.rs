//! HTML report rendering.
//!
//! The page keeps the shape club newsletters have always pasted from:
//!
//! ```text
//! <div class="race">
//!   <hr class="race_header">
//!   <h1>Ho Ho Ho 5K</h1>
//!   <p class="race_date">2013-12-14</p>
//!   <p class="provenance">Complete results <a href="...">here</a> on BestRace.</p>
//!   <table class="actual_results">...</table>
//! </div>
//! ```
//!
//! followed by the ambiguous-name and skipped-race lists.

use crate::models::{MatchedResult, RunReport, SkipKind};
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Escape text for use in element content and double-quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn skip_label(kind: SkipKind) -> &'static str {
    match kind {
        SkipKind::Discovery => "discovery",
        SkipKind::Fetch => "download",
        SkipKind::Parse => "parse",
    }
}

fn result_row(out: &mut String, result: &MatchedResult) -> std::fmt::Result {
    let f = &result.finisher;
    writeln!(
        out,
        "      <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        f.place.map(|p| p.to_string()).unwrap_or_default(),
        escape(&result.member.display_name()),
        f.time.map(|t| t.to_string()).unwrap_or_default(),
        escape(&f.raw_name),
    )
}

/// Render a [`RunReport`] as a standalone HTML document.
pub fn render_report(report: &RunReport) -> Result<String, std::fmt::Error> {
    let mut html = String::new();
    let title = format!(
        "{} results, {}",
        report.source_id.display_name(),
        report.date_range
    );

    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html>")?;
    writeln!(html, "<head>")?;
    writeln!(html, "  <meta charset=\"utf-8\">")?;
    writeln!(html, "  <title>{}</title>", escape(&title))?;
    writeln!(html, "</head>")?;
    writeln!(html, "<body>")?;
    writeln!(html, "<h1>{}</h1>", escape(&title))?;

    if report.timed_out {
        writeln!(
            html,
            "<p class=\"timed_out\">The run hit its time limit; some races were not checked.</p>"
        )?;
    }

    for group in report.results.by_race() {
        writeln!(html, "<div class=\"race\">")?;
        writeln!(html, "  <hr class=\"race_header\">")?;
        writeln!(html, "  <h2>{}</h2>", escape(group.race_name))?;
        writeln!(html, "  <p class=\"race_date\">{}</p>", group.race_date)?;
        writeln!(
            html,
            "  <p class=\"provenance\">Complete results <a href=\"{}\">here</a> on {}.</p>",
            escape(group.race_url),
            escape(group.source_id.display_name())
        )?;
        writeln!(html, "  <table class=\"actual_results\">")?;
        writeln!(
            html,
            "    <thead><tr><th>Place</th><th>Name</th><th>Time</th><th>As listed</th></tr></thead>"
        )?;
        writeln!(html, "    <tbody>")?;
        for result in &group.results {
            result_row(&mut html, result)?;
        }
        writeln!(html, "    </tbody>")?;
        writeln!(html, "  </table>")?;
        writeln!(html, "</div>")?;
    }

    if report.results.is_empty() {
        writeln!(html, "<p class=\"no_results\">No club members found.</p>")?;
    }

    if !report.ambiguous.is_empty() {
        writeln!(html, "<div class=\"ambiguous\">")?;
        writeln!(html, "  <h2>Ambiguous names</h2>")?;
        writeln!(html, "  <ul>")?;
        for a in &report.ambiguous {
            let names = a
                .candidates
                .iter()
                .map(|m| escape(&m.display_name()))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                html,
                "    <li>{} in <a href=\"{}\">{}</a> ({}): could be {}</li>",
                escape(&a.finisher.raw_name),
                escape(&a.finisher.race_url),
                escape(&a.finisher.race_name),
                a.finisher.race_date,
                names
            )?;
        }
        writeln!(html, "  </ul>")?;
        writeln!(html, "</div>")?;
    }

    if !report.skipped.is_empty() {
        writeln!(html, "<div class=\"skipped\">")?;
        writeln!(html, "  <h2>Skipped races</h2>")?;
        writeln!(html, "  <ul>")?;
        for s in &report.skipped {
            let label = s.race_name.as_deref().unwrap_or(&s.url);
            writeln!(
                html,
                "    <li><a href=\"{}\">{}</a>: {} failed ({})</li>",
                escape(&s.url),
                escape(label),
                skip_label(s.kind),
                escape(&s.reason)
            )?;
        }
        writeln!(html, "  </ul>")?;
        writeln!(html, "</div>")?;
    }

    writeln!(
        html,
        "<p class=\"summary\">{} races checked, {} parsed, {} members found.</p>",
        report.races_attempted,
        report.races_parsed,
        report.results.len()
    )?;
    writeln!(html, "</body>")?;
    writeln!(html, "</html>")?;
    Ok(html)
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_report_html(report: &RunReport, path: &Path) -> Result<(), Box<dyn Error>> {
    let html = render_report(report)?;
    info!(bytes = html.len(), "Writing HTML");
    fs::write(path, html).await?;
    info!("Wrote HTML report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::{
        AmbiguousFinisher, DateRange, FinisherRecord, MatchConfidence, MemberRecord,
        SkippedRace, SourceId,
    };
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn finisher(name: &str, place: u32, race: &str, url: &str, date: NaiveDate) -> FinisherRecord {
        FinisherRecord {
            raw_name: name.to_string(),
            place: Some(place),
            time: "19:05".parse().ok(),
            race_date: date,
            source_id: SourceId::BestRace,
            race_name: race.to_string(),
            race_url: url.to_string(),
        }
    }

    fn report() -> RunReport {
        let results = aggregate(vec![
            MatchedResult {
                finisher: finisher("DOE, JANE", 12, "Ho Ho Ho 5K", "http://x/r/a.htm", d(2013, 12, 14)),
                member: MemberRecord::new("Doe", "Jane"),
                confidence: MatchConfidence::Exact,
            },
            MatchedResult {
                finisher: finisher("Smith & Sons", 3, "Turkey <Trot>", "http://x/r/b.htm", d(2013, 11, 28)),
                member: MemberRecord::new("Sons", "Smith"),
                confidence: MatchConfidence::Normalized,
            },
        ]);
        RunReport {
            source_id: SourceId::BestRace,
            date_range: DateRange::new(d(2013, 11, 1), d(2013, 12, 31)).unwrap(),
            results,
            ambiguous: vec![AmbiguousFinisher {
                finisher: finisher("Pat Lee", 40, "Ho Ho Ho 5K", "http://x/r/a.htm", d(2013, 12, 14)),
                candidates: vec![MemberRecord::new("Lee", "Pat"), MemberRecord::new("Lee", "Pat")],
            }],
            skipped: vec![SkippedRace {
                url: "http://x/r/c.htm".into(),
                race_name: None,
                kind: SkipKind::Fetch,
                reason: "not found".into(),
            }],
            races_attempted: 3,
            races_parsed: 2,
            timed_out: false,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b> & \"c\""), "a&lt;b&gt; &amp; &quot;c&quot;");
    }

    #[test]
    fn test_render_orders_races_and_escapes() {
        let html = render_report(&report()).unwrap();
        let trot = html.find("Turkey &lt;Trot&gt;").unwrap();
        let hoho = html.find("<h2>Ho Ho Ho 5K</h2>").unwrap();
        assert!(trot < hoho, "races must be in date order");
        assert_eq!(html.matches("<div class=\"race\">").count(), 2);
        assert!(html.contains(
            "Complete results <a href=\"http://x/r/a.htm\">here</a> on BestRace."
        ));
        assert!(html.contains("<td>12</td><td>Jane Doe</td><td>19:05</td><td>DOE, JANE</td>"));
        assert!(html.contains("Smith &amp; Sons"));
    }

    #[test]
    fn test_render_side_lists() {
        let html = render_report(&report()).unwrap();
        assert!(html.contains("Ambiguous names"));
        assert!(html.contains("Pat Lee in <a href=\"http://x/r/a.htm\">Ho Ho Ho 5K</a>"));
        assert!(html.contains("Skipped races"));
        assert!(html.contains("download failed (not found)"));
        assert!(html.contains("3 races checked, 2 parsed, 2 members found."));
        assert!(!html.contains("timed_out"));
    }

    #[test]
    fn test_render_empty_timed_out_report() {
        let mut r = report();
        r.results = aggregate(Vec::new());
        r.ambiguous.clear();
        r.skipped.clear();
        r.timed_out = true;
        let html = render_report(&r).unwrap();
        assert!(html.contains("No club members found."));
        assert!(html.contains("class=\"timed_out\""));
        assert!(!html.contains("Skipped races"));
    }

    #[test]
    fn test_render_escapes_source_name() {
        let results = aggregate(vec![MatchedResult {
            finisher: FinisherRecord {
                source_id: SourceId::LmSports,
                ..finisher("Rob Fehn", 1, "Trail Run", "http://www.lmsports.com/trail13.htm", d(2013, 11, 2))
            },
            member: MemberRecord::new("Fehn", "Rob"),
            confidence: MatchConfidence::Exact,
        }]);
        let r = RunReport {
            source_id: SourceId::LmSports,
            results,
            ..report()
        };
        let html = render_report(&r).unwrap();
        assert!(html.contains("<title>L&amp;M Sports results,"));
        assert!(html.contains("here</a> on L&amp;M Sports.</p>"));
    }

    #[tokio::test]
    async fn test_write_report_html() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("results.html");
        write_report_html(&report(), &path).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<!DOCTYPE html>"));
    }
}
