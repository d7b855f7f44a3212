//! Policy advisor command.

use std::path::Path;

use anyhow::{Context, Result};
use edgeguard_config::EdgeguardConfig;
use edgeguard_types::{IdentityId, ServiceId};

use crate::model::Model;

pub fn run(
    config: &EdgeguardConfig,
    model_path: &Path,
    identity: &str,
    service: &str,
    json: bool,
) -> Result<()> {
    let engine = Model::load(model_path)?.into_engine(config)?;

    let report = engine
        .advise(&IdentityId::new(identity), &ServiceId::new(service))
        .with_context(|| format!("Failed to advise on {identity} -> {service}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
        println!();
        println!(
            "verdict: {}",
            match (report.can_dial(), report.can_bind()) {
                (true, true) => "can dial and bind",
                (true, false) => "can dial",
                (false, true) => "can bind",
                (false, false) => "no usable access",
            }
        );
    }
    Ok(())
}
