//! Named model trees and their persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::codec::{
    deserialize_data, deserialize_structure, serialize_data, serialize_structure, CodecError,
    DataReport, Format, TypeDescriptor, TypeRegistry,
};
use crate::model::{GameLookup, LocationSet, ModelTree};
use crate::remote::{RemoteService, TransportError};
use crate::store::{storage_key, LocalStorage, PayloadKind, StorageError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model `{0}` not found")]
    ModelNotFound(String),

    #[error("model `{0}` already exists")]
    DuplicateModel(String),

    #[error("no remote service configured")]
    RemoteNotConfigured,

    #[error("no {kind} payload for `{purpose}` in {format} format")]
    MissingPayload {
        purpose: String,
        kind: &'static str,
        format: Format,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Where a payload is saved to or loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Local,
    Remote,
}

/// Owns every model tree by purpose and routes save/load requests through
/// the codecs to local storage or the remote service.
pub struct ModelRegistry {
    models: BTreeMap<String, ModelTree>,
    types: TypeRegistry,
    storage: Box<dyn LocalStorage>,
    remote: Option<RemoteService>,
    lookup: Option<Arc<dyn GameLookup>>,
}

impl ModelRegistry {
    pub fn new(storage: impl LocalStorage + 'static) -> Self {
        Self::with_storage(Box::new(storage))
    }

    pub fn with_storage(storage: Box<dyn LocalStorage>) -> Self {
        Self {
            models: BTreeMap::new(),
            types: TypeRegistry::new(),
            storage,
            remote: None,
            lookup: None,
        }
    }

    pub fn with_remote(mut self, remote: RemoteService) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn set_remote(&mut self, remote: Option<RemoteService>) {
        self.remote = remote;
    }

    pub fn remote(&self) -> Result<&RemoteService, RegistryError> {
        self.remote.as_ref().ok_or(RegistryError::RemoteNotConfigured)
    }

    /// Install the game-state lookup on every current and future model.
    pub fn set_lookup(&mut self, lookup: Option<Arc<dyn GameLookup>>) {
        for tree in self.models.values_mut() {
            tree.set_lookup(lookup.clone());
        }
        self.lookup = lookup;
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn register_types<I>(&mut self, descriptors: I)
    where
        I: IntoIterator,
        I::Item: Into<TypeDescriptor>,
    {
        self.types.register_types(descriptors);
    }

    // ============================================================
    // Models
    // ============================================================

    pub fn add_model(&mut self, purpose: &str) -> Result<&mut ModelTree, RegistryError> {
        self.insert_model(ModelTree::new(purpose))
    }

    /// Register a tree built elsewhere under its own purpose.
    pub fn insert_model(&mut self, mut tree: ModelTree) -> Result<&mut ModelTree, RegistryError> {
        let purpose = tree.purpose().to_string();
        if self.models.contains_key(&purpose) {
            return Err(RegistryError::DuplicateModel(purpose));
        }
        tree.set_lookup(self.lookup.clone());
        tracing::debug!("Added model {}", purpose);
        Ok(self.models.entry(purpose).or_insert(tree))
    }

    pub fn model(&self, purpose: &str) -> Option<&ModelTree> {
        self.models.get(purpose)
    }

    pub fn model_mut(&mut self, purpose: &str) -> Option<&mut ModelTree> {
        self.models.get_mut(purpose)
    }

    pub fn remove_model(&mut self, purpose: &str) -> Option<ModelTree> {
        self.models.remove(purpose)
    }

    pub fn contains(&self, purpose: &str) -> bool {
        self.models.contains_key(purpose)
    }

    /// Purposes in sorted order.
    pub fn purposes(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    // ============================================================
    // Structure
    // ============================================================

    pub fn save_structure(
        &self,
        purpose: &str,
        endpoint: Endpoint,
        format: Format,
    ) -> Result<(), RegistryError> {
        let tree = self.existing(purpose)?;
        let payload = serialize_structure(tree, tree.root(), LocationSet::empty(), format)?;
        self.store(purpose, PayloadKind::Structure, endpoint, format, payload)
    }

    /// Returns the number of nodes created.
    pub fn load_structure(
        &mut self,
        purpose: &str,
        endpoint: Endpoint,
        format: Format,
    ) -> Result<usize, RegistryError> {
        self.existing(purpose)?;
        let payload = self.fetch(purpose, PayloadKind::Structure, endpoint, format)?;
        let tree = self.existing_mut(purpose)?;
        let created = deserialize_structure(tree, &payload, format)?;
        tracing::info!("Loaded structure of {} ({} new nodes)", purpose, created);
        Ok(created)
    }

    pub fn delete_structure(
        &self,
        purpose: &str,
        endpoint: Endpoint,
        format: Format,
    ) -> Result<bool, RegistryError> {
        self.discard(purpose, PayloadKind::Structure, endpoint, format)
    }

    // ============================================================
    // Data
    // ============================================================

    pub fn save_data(
        &self,
        purpose: &str,
        endpoint: Endpoint,
        format: Format,
        filter: LocationSet,
    ) -> Result<(), RegistryError> {
        let tree = self.existing(purpose)?;
        let payload = serialize_data(tree, tree.root(), filter, format)?;
        self.store(purpose, PayloadKind::Data, endpoint, format, payload)
    }

    pub fn load_data(
        &mut self,
        purpose: &str,
        endpoint: Endpoint,
        format: Format,
        filter: LocationSet,
    ) -> Result<DataReport, RegistryError> {
        self.existing(purpose)?;
        let payload = self.fetch(purpose, PayloadKind::Data, endpoint, format)?;
        let tree = self
            .models
            .get_mut(purpose)
            .ok_or_else(|| RegistryError::ModelNotFound(purpose.to_string()))?;
        let root = tree.root();
        let report = deserialize_data(tree, root, filter, &payload, format, &self.types)?;
        tracing::info!(
            "Loaded data of {}: {} applied, {} skipped, {} unmatched",
            purpose,
            report.applied,
            report.skipped.len(),
            report.unmatched.len()
        );
        Ok(report)
    }

    pub fn delete_data(
        &self,
        purpose: &str,
        endpoint: Endpoint,
        format: Format,
    ) -> Result<bool, RegistryError> {
        self.discard(purpose, PayloadKind::Data, endpoint, format)
    }

    // ============================================================
    // Endpoints
    // ============================================================

    fn existing(&self, purpose: &str) -> Result<&ModelTree, RegistryError> {
        self.models
            .get(purpose)
            .ok_or_else(|| RegistryError::ModelNotFound(purpose.to_string()))
    }

    fn existing_mut(&mut self, purpose: &str) -> Result<&mut ModelTree, RegistryError> {
        self.models
            .get_mut(purpose)
            .ok_or_else(|| RegistryError::ModelNotFound(purpose.to_string()))
    }

    fn store(
        &self,
        purpose: &str,
        kind: PayloadKind,
        endpoint: Endpoint,
        format: Format,
        payload: Vec<u8>,
    ) -> Result<(), RegistryError> {
        let size = payload.len();
        match endpoint {
            Endpoint::Local => self.storage.save(&storage_key(purpose, kind, format), &payload)?,
            Endpoint::Remote => self.remote()?.put(purpose, kind, format, payload)?,
        }
        tracing::info!(
            "Saved {} {} of {} ({} bytes, {:?})",
            format,
            kind.as_str(),
            purpose,
            size,
            endpoint
        );
        Ok(())
    }

    fn fetch(
        &self,
        purpose: &str,
        kind: PayloadKind,
        endpoint: Endpoint,
        format: Format,
    ) -> Result<Vec<u8>, RegistryError> {
        let payload = match endpoint {
            Endpoint::Local => self.storage.load(&storage_key(purpose, kind, format))?,
            Endpoint::Remote => self.remote()?.get(purpose, kind, format)?,
        };
        payload.ok_or_else(|| RegistryError::MissingPayload {
            purpose: purpose.to_string(),
            kind: kind.as_str(),
            format,
        })
    }

    fn discard(
        &self,
        purpose: &str,
        kind: PayloadKind,
        endpoint: Endpoint,
        format: Format,
    ) -> Result<bool, RegistryError> {
        self.existing(purpose)?;
        Ok(match endpoint {
            Endpoint::Local => self.storage.delete(&storage_key(purpose, kind, format))?,
            Endpoint::Remote => self.remote()?.delete(purpose, kind, format)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StorageLocation;
    use crate::store::MemoryStore;

    #[test]
    fn duplicate_models_are_rejected() {
        let mut registry = ModelRegistry::new(MemoryStore::new());
        registry.add_model("User").unwrap();
        assert!(matches!(
            registry.add_model("User"),
            Err(RegistryError::DuplicateModel(p)) if p == "User"
        ));
    }

    #[test]
    fn unknown_purpose_is_reported() {
        let mut registry = ModelRegistry::new(MemoryStore::new());
        assert!(matches!(
            registry.load_structure("Nope", Endpoint::Local, Format::Json),
            Err(RegistryError::ModelNotFound(_))
        ));
        assert!(matches!(
            registry.save_data("Nope", Endpoint::Local, Format::Json, LocationSet::empty()),
            Err(RegistryError::ModelNotFound(_))
        ));
    }

    #[test]
    fn remote_requires_configuration() {
        let mut registry = ModelRegistry::new(MemoryStore::new());
        registry.add_model("User").unwrap();
        assert!(matches!(
            registry.save_structure("User", Endpoint::Remote, Format::Json),
            Err(RegistryError::RemoteNotConfigured)
        ));
    }

    #[test]
    fn missing_payload_is_an_error() {
        let mut registry = ModelRegistry::new(MemoryStore::new());
        registry.add_model("User").unwrap();
        assert!(matches!(
            registry.load_data("User", Endpoint::Local, Format::Xml, LocationSet::empty()),
            Err(RegistryError::MissingPayload { kind: "data", .. })
        ));
    }

    #[test]
    fn lookup_reaches_models_added_later() {
        let mut registry = ModelRegistry::new(MemoryStore::new());
        registry.set_lookup(Some(Arc::new(|_: &str, name: &str| {
            Some(crate::model::NodeValue::from(name.len() as u32))
        })));

        let tree = registry.add_model("Hud").unwrap();
        let root = tree.root();
        let fps = tree.add_child(root, "fps", StorageLocation::Game).unwrap();
        assert_eq!(tree.value(fps), Some(crate::model::NodeValue::U32(3)));
    }
}
