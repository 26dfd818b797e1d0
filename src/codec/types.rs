use std::collections::HashMap;

use crate::model::ValueKind;

/// What a wire type tag stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Scalar(ValueKind),
    Composite(CompositeType),
}

impl TypeDescriptor {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(kind) => kind.tag(),
            Self::Composite(composite) => composite.name(),
        }
    }
}

impl From<CompositeType> for TypeDescriptor {
    fn from(composite: CompositeType) -> Self {
        Self::Composite(composite)
    }
}

/// Schema of an application-defined composite: its fully-qualified name and
/// the ordered type tags of its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    name: String,
    fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub type_tag: String,
}

impl CompositeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field. `type_tag` may name a scalar kind or another
    /// registered composite.
    pub fn field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            type_tag: type_tag.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }
}

/// Maps wire type tags to descriptors.
///
/// A new registry already knows every scalar kind; applications add their
/// composites with [`TypeRegistry::register`]. Records whose tag is not
/// registered are dropped during data loading.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for kind in ValueKind::ALL {
            registry.register(TypeDescriptor::Scalar(kind));
        }
        registry
    }

    /// A registry with no types at all, not even scalars.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register a descriptor under its name, returning any descriptor it
    /// replaced.
    pub fn register(&mut self, descriptor: impl Into<TypeDescriptor>) -> Option<TypeDescriptor> {
        let descriptor = descriptor.into();
        self.types.insert(descriptor.name().to_string(), descriptor)
    }

    pub fn register_types<I>(&mut self, descriptors: I)
    where
        I: IntoIterator,
        I::Item: Into<TypeDescriptor>,
    {
        for descriptor in descriptors {
            self.register(descriptor);
        }
    }

    pub fn get(&self, tag: &str) -> Option<&TypeDescriptor> {
        self.types.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_knows_scalars() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.len(), ValueKind::ALL.len());
        assert_eq!(
            registry.get("timestamp"),
            Some(&TypeDescriptor::Scalar(ValueKind::Timestamp))
        );
        assert!(TypeRegistry::empty().is_empty());
    }

    #[test]
    fn registering_replaces_by_name() {
        let mut registry = TypeRegistry::new();
        let v1 = CompositeType::new("game.Reward").field("a", "i32");
        let v2 = CompositeType::new("game.Reward").field("a", "i64");

        assert!(registry.register(v1.clone()).is_none());
        assert_eq!(registry.register(v2), Some(TypeDescriptor::Composite(v1)));
        assert!(registry.contains("game.Reward"));
    }
}
