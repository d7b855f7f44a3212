//! Derived link listing.

use std::path::Path;

use anyhow::Result;
use edgeguard::{Queries, Relation};
use edgeguard_config::EdgeguardConfig;

use crate::model::Model;

pub fn run(config: &EdgeguardConfig, model_path: &Path, relation: Option<Relation>) -> Result<()> {
    let engine = Model::load(model_path)?.into_engine(config)?;
    let snapshot = engine.read()?;

    let relations = match relation {
        Some(relation) => vec![relation],
        None => Relation::ALL.to_vec(),
    };

    for relation in relations {
        let links = snapshot.links(relation)?;
        println!("{relation} ({} links)", links.len());
        for (a, b, count) in links {
            println!("  {a} -> {b}  [{count}]");
        }
    }
    Ok(())
}
