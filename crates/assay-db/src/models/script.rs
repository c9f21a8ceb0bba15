//! Analysis script models for database storage.

use crate::error::Result;
use assay_core::{
    AnalysisScript, AnalysisScriptTemplate, BindingSpec, ScriptId, ScriptTemplateId,
};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Stored analysis script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 6, version = 1)]
#[native_db]
pub struct StoredScript {
    #[primary_key]
    pub id: u64,
    /// Script name, the lookup key for runs.
    #[secondary_key(unique)]
    pub name: String,
    /// Script body.
    pub script: String,
    /// Serialized input specs.
    pub inputs: Vec<u8>,
    /// Linked script template; supplies body and inputs when set.
    pub template_id: Option<u64>,
}

impl StoredScript {
    /// Create from an AnalysisScript.
    pub fn from_script(script: &AnalysisScript) -> Result<Self> {
        Ok(Self {
            id: script.id.raw(),
            name: script.name.clone(),
            script: script.script.clone(),
            inputs: bincode::serialize(&script.inputs)?,
            template_id: script.template_id.map(|t| t.raw()),
        })
    }

    /// Convert to an AnalysisScript.
    pub fn to_script(&self) -> Result<AnalysisScript> {
        let inputs: Vec<BindingSpec> = bincode::deserialize(&self.inputs)?;
        Ok(AnalysisScript {
            id: ScriptId(self.id),
            name: self.name.clone(),
            script: self.script.clone(),
            inputs,
            template_id: self.template_id.map(ScriptTemplateId),
        })
    }
}

/// Stored analysis script template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 7, version = 1)]
#[native_db]
pub struct StoredScriptTemplate {
    #[primary_key]
    pub id: u64,
    pub name: String,
    pub script: String,
    /// Serialized input specs.
    pub inputs: Vec<u8>,
}

impl StoredScriptTemplate {
    /// Create from an AnalysisScriptTemplate.
    pub fn from_template(template: &AnalysisScriptTemplate) -> Result<Self> {
        Ok(Self {
            id: template.id.raw(),
            name: template.name.clone(),
            script: template.script.clone(),
            inputs: bincode::serialize(&template.inputs)?,
        })
    }

    /// Convert to an AnalysisScriptTemplate.
    pub fn to_template(&self) -> Result<AnalysisScriptTemplate> {
        Ok(AnalysisScriptTemplate {
            id: ScriptTemplateId(self.id),
            name: self.name.clone(),
            script: self.script.clone(),
            inputs: bincode::deserialize(&self.inputs)?,
        })
    }
}
