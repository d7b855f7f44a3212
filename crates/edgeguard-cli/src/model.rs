//! Declarative policy models.
//!
//! A model file lists entities, policies and configs as TOML tables:
//!
//! ```toml
//! [[services]]
//! id = "web"
//! roles = ["public"]
//!
//! [[identities]]
//! id = "alice"
//! roles = ["staff"]
//!
//! [[service_policies]]
//! id = "staff-dial"
//! type = "Dial"
//! service_roles = ["#public"]
//! identity_roles = ["#staff"]
//! ```
//!
//! Names default to ids. Policies are never referenced by id, so a policy
//! entry may omit it and receive a generated one. Records are loaded in dependency order so that
//! `@id` references and config ids resolve regardless of file layout.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use edgeguard::{
    Config, EdgeRouter, EdgeRouterPolicy, Engine, Identity, Mutation, NoopNotifier, Service,
    ServiceEdgeRouterPolicy, ServicePolicy,
};
use edgeguard_config::EdgeguardConfig;
use edgeguard_types::{PolicyId, PolicyType, Semantic};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Model {
    pub configs: Vec<ConfigEntry>,
    pub services: Vec<EntityEntry>,
    pub identities: Vec<EntityEntry>,
    pub edge_routers: Vec<EntityEntry>,
    pub service_policies: Vec<PolicyEntry>,
    pub service_edge_router_policies: Vec<PolicyEntry>,
    pub edge_router_policies: Vec<PolicyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityEntry {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Config ids; services only.
    #[serde(default)]
    pub configs: Vec<String>,
}

impl EntityEntry {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Service policies only.
    #[serde(rename = "type")]
    pub policy_type: Option<PolicyType>,
    #[serde(default)]
    pub semantic: Semantic,
    #[serde(default)]
    pub service_roles: Vec<String>,
    #[serde(default)]
    pub identity_roles: Vec<String>,
    #[serde(default)]
    pub edge_router_roles: Vec<String>,
}

impl PolicyEntry {
    /// The entry's id, or a generated one, and its name.
    fn identity(&self) -> (PolicyId, String) {
        let id = self.id.clone().map_or_else(PolicyId::generate, PolicyId::new);
        let name = self.name.clone().unwrap_or_else(|| id.as_str().to_string());
        (id, name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigEntry {
    pub id: String,
    pub name: Option<String>,
    /// Arbitrary TOML, stored as its JSON rendering.
    pub data: toml::Value,
}

impl Model {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid model file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Builds an engine holding every record of the model.
    pub fn into_engine(self, config: &EdgeguardConfig) -> Result<Engine> {
        let engine = Engine::from_config(config, Arc::new(NoopNotifier));
        engine
            .update(|m| self.apply(m))
            .context("Failed to load model into engine")?;
        tracing::info!(
            services = self.services.len(),
            identities = self.identities.len(),
            edge_routers = self.edge_routers.len(),
            "model loaded"
        );
        Ok(engine)
    }

    fn apply(&self, m: &mut Mutation<'_>) -> Result<(), edgeguard::EngineError> {
        for entry in &self.configs {
            let name = entry.name.as_deref().unwrap_or(&entry.id);
            m.create_config(Config::from_json(entry.id.as_str(), name, &to_json(&entry.data)))?;
        }

        for entry in &self.services {
            m.create_service(
                Service::new(entry.id.as_str(), entry.name())
                    .with_role_attributes(entry.roles.iter().cloned())
                    .with_configs(entry.configs.iter().map(String::as_str)),
            )?;
        }
        for entry in &self.identities {
            m.create_identity(
                Identity::new(entry.id.as_str(), entry.name())
                    .with_role_attributes(entry.roles.iter().cloned()),
            )?;
        }
        for entry in &self.edge_routers {
            m.create_edge_router(
                EdgeRouter::new(entry.id.as_str(), entry.name())
                    .with_role_attributes(entry.roles.iter().cloned()),
            )?;
        }

        for entry in &self.service_policies {
            let (id, name) = entry.identity();
            m.create_service_policy(
                ServicePolicy::new(id, name, entry.policy_type.unwrap_or(PolicyType::Dial))
                .with_semantic(entry.semantic)
                .with_service_roles(entry.service_roles.iter().cloned())
                .with_identity_roles(entry.identity_roles.iter().cloned()),
            )?;
        }
        for entry in &self.service_edge_router_policies {
            let (id, name) = entry.identity();
            m.create_service_edge_router_policy(
                ServiceEdgeRouterPolicy::new(id, name)
                    .with_semantic(entry.semantic)
                    .with_service_roles(entry.service_roles.iter().cloned())
                    .with_edge_router_roles(entry.edge_router_roles.iter().cloned()),
            )?;
        }
        for entry in &self.edge_router_policies {
            let (id, name) = entry.identity();
            m.create_edge_router_policy(
                EdgeRouterPolicy::new(id, name)
                    .with_semantic(entry.semantic)
                    .with_identity_roles(entry.identity_roles.iter().cloned())
                    .with_edge_router_roles(entry.edge_router_roles.iter().cloned()),
            )?;
        }
        Ok(())
    }
}

fn to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => serde_json::Value::from(*f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(d) => serde_json::Value::String(d.to_string()),
        toml::Value::Array(items) => items.iter().map(to_json).collect(),
        toml::Value::Table(table) => table
            .iter()
            .map(|(k, v)| (k.clone(), to_json(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    }
}
