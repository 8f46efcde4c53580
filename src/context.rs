//! The type registry: resolution, memoization and explicit registration.
//!
//! A [`ShapeContext`] owns every descriptor it has published. Descriptors are published
//! insert-once: concurrent first resolutions of one type may each build a descriptor, but only
//! the first one inserted is kept and every caller receives that one. Published descriptors are
//! immutable and complete, so conversions read them without locking.
//!
//! Resolution is depth-first over the field graph. Each call tracks the chain of types it is
//! resolving, so a recursive type graph fails with a structural inference error instead of
//! overflowing the stack.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use rayon::prelude::*;
use tracing::debug;

use crate::bridge::{self, AtomicBridge, DataBridge};
use crate::config::ShapeConfig;
use crate::correlate::Correlator;
use crate::descriptor::{Classification, TypeDescriptor};
use crate::error::{Result, ShapeError};
use crate::meta::{Shaped, TypeRef};
use crate::pipeline;
use crate::policy::{self, Plan};
use crate::value::{FromValue, Value};

type Registry = HashMap<TypeId, Arc<TypeDescriptor>>;

/// Registry of type descriptors.
///
/// `ShapeContext` is `Send + Sync`; share one instance across threads, typically behind an
/// `Arc` or in a `static`.
pub struct ShapeContext {
    config: ShapeConfig,
    descriptors: RwLock<Registry>,
}

/// Types currently being resolved by one `resolve` call, outermost first.
type InProgress = Vec<TypeRef>;

impl ShapeContext {
    /// A context with the default configuration and the primitive identity bridges.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a context.
    pub fn builder() -> ShapeContextBuilder {
        ShapeContextBuilder::default()
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    /// Returns the descriptor of `T`, resolving it on first use.
    pub fn resolve<T: Shaped + ?Sized>(&self) -> Result<Arc<TypeDescriptor>> {
        self.resolve_ref(TypeRef::of::<T>())
    }

    /// Returns the descriptor of `ty`, resolving it on first use.
    ///
    /// Failures are not cached: resolving again after registering a bridge can succeed.
    pub fn resolve_ref(&self, ty: TypeRef) -> Result<Arc<TypeDescriptor>> {
        self.resolve_within(ty, &mut InProgress::new())
    }

    /// Returns the published descriptor of `T` without resolving it.
    pub fn lookup<T: Shaped + ?Sized>(&self) -> Option<Arc<TypeDescriptor>> {
        self.published(TypeId::of::<T>())
    }

    /// Returns `true` if a descriptor for `T` is published.
    pub fn contains<T: Shaped + ?Sized>(&self) -> bool {
        self.lookup::<T>().is_some()
    }

    /// Number of published descriptors, bridges included.
    pub fn len(&self) -> usize {
        self.read_registry().len()
    }

    /// Returns `true` if nothing is published.
    pub fn is_empty(&self) -> bool {
        self.read_registry().is_empty()
    }

    /// Resolves several types in parallel.
    ///
    /// Returns an error of one failing type if any fails; the descriptors of the others stay
    /// published.
    pub fn prewarm(&self, types: &[TypeRef]) -> Result<()> {
        types
            .par_iter()
            .try_for_each(|ty| self.resolve_ref(*ty).map(|_| ()))
    }

    // --- REGISTRATION ---

    /// Publishes `bridge` as the atomic descriptor of its subject type.
    ///
    /// Fails with [`ShapeError::RegistrationConflict`] if the type already has a descriptor,
    /// inferred or registered.
    pub fn register_bridge(&self, bridge: AtomicBridge) -> Result<Arc<TypeDescriptor>> {
        let descriptor = Arc::new(pipeline::compile_atomic(bridge));
        let subject = descriptor.subject();

        let mut registry = self.write_registry();
        if registry.contains_key(&subject.id()) {
            return Err(ShapeError::RegistrationConflict {
                type_name: subject.name().to_string(),
            });
        }
        registry.insert(subject.id(), Arc::clone(&descriptor));
        debug!(
            type_name = subject.name(),
            data_type = descriptor.bridge().map(AtomicBridge::data_type),
            "registered atomic bridge"
        );
        Ok(descriptor)
    }

    /// Registers a typed [`DataBridge`] for `T`.
    pub fn register_atom<T, D, B>(&self, bridge: B) -> Result<Arc<TypeDescriptor>>
    where
        T: Shaped + Send,
        D: Into<Value> + FromValue + 'static,
        B: DataBridge<T, D>,
    {
        self.register_bridge(AtomicBridge::from_data::<T, D, B>(bridge))
    }

    /// Registers the variant-name bridge of a `ShapeEnum` enumeration.
    pub fn register_enum<E: Shaped>(&self) -> Result<Arc<TypeDescriptor>> {
        self.register_bridge(AtomicBridge::enumeration::<E>()?)
    }

    /// Registers the bridge of `Vec<T>`, resolving `T` first.
    pub fn register_collection<T: Shaped + Send>(&self) -> Result<Arc<TypeDescriptor>> {
        let element = self.resolve::<T>()?;
        self.register_bridge(AtomicBridge::collection::<T>(element))
    }

    /// Registers the bridge of `Option<T>`, resolving `T` first.
    pub fn register_optional<T: Shaped + Send>(&self) -> Result<Arc<TypeDescriptor>> {
        let inner = self.resolve::<T>()?;
        self.register_bridge(AtomicBridge::optional::<T>(inner))
    }

    // --- RESOLUTION ---

    fn resolve_within(
        &self,
        ty: TypeRef,
        in_progress: &mut InProgress,
    ) -> Result<Arc<TypeDescriptor>> {
        if let Some(descriptor) = self.published(ty.id()) {
            return Ok(descriptor);
        }

        // 1. Guard against recursive and overly deep type graphs.
        if in_progress.contains(&ty) {
            let chain: Vec<&str> = in_progress
                .iter()
                .chain(std::iter::once(&ty))
                .map(TypeRef::name)
                .collect();
            return Err(ShapeError::inference(
                ty.name(),
                format!("recursive type: {}", chain.join(" -> ")),
            ));
        }
        if in_progress.len() >= self.config.max_depth {
            return Err(ShapeError::inference(
                ty.name(),
                format!("nested deeper than {} types", self.config.max_depth),
            ));
        }

        // 2. Build depth-first.
        in_progress.push(ty);
        let built = self.build(ty, in_progress);
        in_progress.pop();

        // 3. Publish. Losing a race hands back the winner's descriptor.
        let descriptor = built?;
        Ok(self.publish(descriptor))
    }

    fn build(&self, ty: TypeRef, in_progress: &mut InProgress) -> Result<TypeDescriptor> {
        debug!(type_name = ty.name(), "resolving");

        match policy::classify(ty)? {
            Plan::SelfDescribing(projection) => {
                let carrier = self.resolve_within(projection.carrier, in_progress)?;
                if carrier.classification() != Classification::Inferred {
                    return Err(ShapeError::inference(
                        ty.name(),
                        format!(
                            "carrier {} is {}, not an inferred composite",
                            carrier.subject().name(),
                            carrier.classification()
                        ),
                    ));
                }
                Ok(pipeline::compile_self_describing(ty, projection, &carrier))
            }
            Plan::Inferred(constructor) => {
                let fields =
                    Correlator::new(&self.config).correlate(ty.name(), ty.info(), constructor)?;
                let nested = fields
                    .iter()
                    .map(|field| self.resolve_within(field.value_type, in_progress))
                    .collect::<Result<Vec<_>>>()?;
                pipeline::compile_inferred(ty, constructor, &fields, nested)
            }
        }
    }

    fn publish(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let subject = descriptor.subject();
        let mut registry = self.write_registry();
        let published = registry
            .entry(subject.id())
            .or_insert_with(|| {
                debug!(
                    type_name = subject.name(),
                    classification = %descriptor.classification(),
                    components = descriptor.components().len(),
                    "published descriptor"
                );
                Arc::new(descriptor)
            });
        Arc::clone(published)
    }

    fn published(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.read_registry().get(&id).cloned()
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShapeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShapeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeContext")
            .field("config", &self.config)
            .field("descriptors", &self.len())
            .finish()
    }
}

/// Configures a [`ShapeContext`].
///
/// ```rust
/// use shapecode::ShapeContext;
///
/// let context = ShapeContext::builder()
///     .max_depth(8)
///     .transparent_call("into_inner")
///     .build();
/// assert!(context.config().is_transparent("into_inner"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShapeContextBuilder {
    config: ShapeConfig,
}

impl ShapeContextBuilder {
    /// Limits the nesting depth of resolved type graphs.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Adds a method the correlator treats as identity.
    pub fn transparent_call(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.config.is_transparent(&name) {
            self.config.transparent_calls.push(name);
        }
        self
    }

    /// Skips registering the primitive identity bridges.
    pub fn without_primitives(mut self) -> Self {
        self.config.register_primitives = false;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ShapeConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the context.
    pub fn build(self) -> ShapeContext {
        let mut registry = Registry::new();
        if self.config.register_primitives {
            for bridge in bridge::primitives() {
                let descriptor = pipeline::compile_atomic(bridge);
                registry.insert(descriptor.subject().id(), Arc::new(descriptor));
            }
        }

        ShapeContext {
            config: self.config,
            descriptors: RwLock::new(registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_published_at_build() {
        let context = ShapeContext::new();
        assert!(context.contains::<i32>());
        assert!(context.contains::<String>());
        assert!(context.contains::<Vec<u8>>());
        assert!(!context.contains::<Vec<u32>>());

        let bare = ShapeContext::builder().without_primitives().build();
        assert!(bare.is_empty());
        assert!(matches!(
            bare.resolve::<i32>(),
            Err(ShapeError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn registrations_never_overwrite() {
        let context = ShapeContext::new();
        let err = context
            .register_bridge(AtomicBridge::identity::<u64>())
            .unwrap_err();
        assert!(matches!(err, ShapeError::RegistrationConflict { .. }));
    }

    #[test]
    fn failed_resolutions_are_not_cached() -> Result<()> {
        let context = ShapeContext::new();
        assert!(context.resolve::<Vec<u32>>().is_err());
        assert!(!context.contains::<Vec<u32>>());

        context.register_collection::<u32>()?;
        assert!(context.resolve::<Vec<u32>>()?.is_atomic());
        Ok(())
    }

    #[test]
    fn builder_settings() {
        let context = ShapeContext::builder()
            .max_depth(3)
            .transparent_call("clone")
            .transparent_call("into_inner")
            .build();
        let config = context.config();
        assert_eq!(config.max_depth, 3);
        assert_eq!(
            config
                .transparent_calls
                .iter()
                .filter(|c| *c == "clone")
                .count(),
            1
        );
        assert!(config.is_transparent("into_inner"));
    }
}
