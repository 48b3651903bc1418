use anyhow::Result;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use splicemodel::Model;
use std::io::Write;

use crate::checker::{ProjectionChecker, ProjectionInput};
use crate::report::ProjectionReport;

/// Route `log` output to stderr, at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

/// Check every input independently. Transcripts whose check fails with an
/// error are logged and left out; the rest keep input order.
pub fn run_batch(model: &Model, inputs: Vec<ProjectionInput>) -> IndexMap<String, ProjectionReport> {
    let style = ProgressStyle::with_template(
        "[{elapsed}] {bar:40.cyan/blue} {human_pos:>7}/{human_len:7} transcripts (eta: {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let progress_bar = ProgressBar::new(inputs.len() as u64).with_style(style);

    let checker = ProjectionChecker::new(model);
    let results: Vec<_> = inputs
        .into_par_iter()
        .map(|input| {
            let result = checker.check(&input);
            progress_bar.inc(1);
            (input.ref_transcript.id, result)
        })
        .collect();
    progress_bar.finish();

    let mut reports = IndexMap::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(report) => {
                reports.insert(id, report);
            }
            Err(err) => warn!("Skipping {}: {:#}", id, err),
        }
    }
    info!("Checked {} transcripts", reports.len());
    reports
}

/// One JSON object per line.
pub fn write_json_lines<'a, W: Write>(
    mut writer: W,
    reports: impl IntoIterator<Item = &'a ProjectionReport>,
) -> Result<()> {
    for report in reports {
        serde_json::to_writer(&mut writer, report)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::report::Status;
    use crate::testutil;

    #[test]
    fn test_batch_keeps_order() {
        testutil::init();
        let model = testutil::model();
        let gene = testutil::three_exon_gene();
        let inputs: Vec<_> = (0..5)
            .map(|i| {
                let mut t = gene.transcript.clone();
                t.id = format!("t{}", i);
                ProjectionInput {
                    ref_transcript: t,
                    alt_transcript: None,
                    ref_seq: gene.seq.clone().into(),
                    alt_seq: gene.seq.clone().into(),
                    alignment: Alignment::identity(gene.seq.len()),
                }
            })
            .collect();
        let reports = run_batch(&model, inputs);
        let ids: Vec<_> = reports.keys().cloned().collect();
        assert_eq!(ids, ["t0", "t1", "t2", "t3", "t4"]);
        assert!(reports.values().all(|r| r.status == Status::Mapped));

        let mut out = Vec::new();
        write_json_lines(&mut out, reports.values()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 5);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["transcript_id"], "t0");
        assert_eq!(first["status"], "mapped");
    }
}
