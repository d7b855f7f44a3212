//! Link integrity check.

use std::path::Path;

use anyhow::{Result, bail};
use edgeguard_config::EdgeguardConfig;

use crate::model::Model;

pub fn run(config: &EdgeguardConfig, model_path: &Path) -> Result<()> {
    let engine = Model::load(model_path)?.into_engine(config)?;
    let report = engine.check_integrity()?;

    for d in &report.discrepancies {
        println!(
            "{}: ({}, {}) stored {:?} mirrored {:?} expected {}",
            d.relation, d.a, d.b, d.stored, d.mirrored, d.expected
        );
    }
    for (relation, rows) in &report.orphaned_reverse_rows {
        println!("{relation}: {rows} reverse rows without a forward row");
    }

    if !report.is_consistent() {
        bail!(
            "{} of {} links disagree with their policies",
            report.discrepancies.len(),
            report.links_checked
        );
    }
    println!("{} links checked, all consistent", report.links_checked);
    Ok(())
}
