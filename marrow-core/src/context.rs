use crate::{
    Convert, Record, Result, RowAccessor,
    convert::{Bridged, ErasedConvert},
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Process-wide cache of compiled row accessors and converter singletons.
///
/// Constructed once at startup and passed by reference to call sites. The
/// single mutex is shared between the accessor and converter caches and is
/// only held during construction, which is rare and performs no I/O;
/// invocation of an accessor is never gated by it. Entries are never evicted:
/// the schema is fixed for the process lifetime.
#[derive(Default)]
pub struct Context {
    inner: Mutex<ContextInner>,
}

#[derive(Default)]
pub(crate) struct ContextInner {
    accessors: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    converters: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    mappings: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or build the accessor of a row type.
    ///
    /// Exactly one build runs per type: concurrent first requests serialize
    /// on the lock and the losers observe the winner's instance. Failed
    /// builds are not cached; a retry re-validates and fails the same way.
    pub fn accessor<R: Record>(&self) -> Result<Arc<RowAccessor<R>>> {
        self.lock().accessor::<R>()
    }

    /// The shared singleton of a converter type.
    pub fn converter<C: Convert>(&self) -> Arc<C> {
        self.lock().converter::<C>()
    }

    /// Make `C` the converter of its member type for columns registered with
    /// `mapped`/`mapped_opt`. A later registration for the same member type
    /// replaces the earlier one.
    pub fn register_converter<C: Convert>(&self) {
        let mut inner = self.lock();
        let converter: Arc<dyn ErasedConvert<C::Member>> =
            Arc::new(Bridged(inner.converter::<C>()));
        inner.mappings.insert(
            TypeId::of::<C::Member>(),
            Arc::new(MappingSlot { converter }),
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ContextInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct MappingSlot<M> {
    converter: Arc<dyn ErasedConvert<M>>,
}

impl ContextInner {
    pub(crate) fn accessor<R: Record>(&mut self) -> Result<Arc<RowAccessor<R>>> {
        let id = TypeId::of::<R>();
        if let Some(cached) = self.accessors.get(&id) {
            if let Ok(accessor) = cached.clone().downcast::<RowAccessor<R>>() {
                return Ok(accessor);
            }
        }
        log::debug!("compiling row accessor for {}", std::any::type_name::<R>());
        // Recursion for nested record types (structured columns) stays inside
        // the already-locked state.
        let accessor = Arc::new(R::mapping().build(self)?);
        self.accessors.insert(id, accessor.clone());
        Ok(accessor)
    }

    pub(crate) fn converter<C: Convert>(&mut self) -> Arc<C> {
        let id = TypeId::of::<C>();
        if let Some(cached) = self.converters.get(&id) {
            if let Ok(converter) = cached.clone().downcast::<C>() {
                return converter;
            }
        }
        let converter = Arc::new(C::default());
        self.converters.insert(id, converter.clone());
        converter
    }

    pub(crate) fn registered_converter<M: Clone + Send + Sync + 'static>(
        &mut self,
    ) -> Option<Arc<dyn ErasedConvert<M>>> {
        self.mappings
            .get(&TypeId::of::<M>())
            .and_then(|v| v.clone().downcast::<MappingSlot<M>>().ok())
            .map(|v| v.converter.clone())
    }
}
