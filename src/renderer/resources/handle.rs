use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Opaque 64-bit id of a resource stored in a [`ResourceMap`]
pub struct Handle<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const INVALID: Self = Self::from_raw(u64::MAX);

    pub const fn from_raw(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> u64 {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.id != u64::MAX
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

// Manual impls so that `T` does not need to implement these traits itself
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({})", self.id)
        } else {
            write!(f, "Handle(INVALID)")
        }
    }
}

/// Storage for resources that live as long as the renderer.
/// Each map owns its id counter, so ids are unique per map and never reused.
pub struct ResourceMap<T> {
    resources: HashMap<u64, T>,
    names: HashMap<String, u64>,
    next_id: u64,
}

impl<T> ResourceMap<T> {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            names: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        let id = self.next_id;
        self.next_id += 1;
        self.resources.insert(id, value);
        Handle::from_raw(id)
    }

    /// Insert a resource and make it findable by `name`.
    /// A later insert under the same name shadows the earlier one.
    pub fn insert_named(&mut self, name: &str, value: T) -> Handle<T> {
        let handle = self.insert(value);
        self.names.insert(name.to_owned(), handle.raw());
        handle
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.resources.get(&handle.raw())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.resources.get_mut(&handle.raw())
    }

    pub fn find(&self, name: &str) -> Handle<T> {
        self.names
            .get(name)
            .map_or(Handle::INVALID, |id| Handle::from_raw(*id))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.resources
            .iter()
            .map(|(id, value)| (Handle::from_raw(*id), value))
    }

    /// Remove every resource, yielding them for teardown. Ids stay retired.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.names.clear();
        self.resources.drain().map(|(_, value)| value)
    }
}

impl<T> Default for ResourceMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mesh;
    struct Texture;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut meshes = ResourceMap::new();
        let a = meshes.insert(Mesh);
        let b = meshes.insert(Mesh);
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        assert!(a < b);
    }

    #[test]
    fn maps_count_independently() {
        let mut meshes = ResourceMap::new();
        let mut textures = ResourceMap::new();
        meshes.insert(Mesh);
        meshes.insert(Mesh);
        let texture = textures.insert(Texture);
        assert_eq!(texture.raw(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_drain() {
        let mut meshes = ResourceMap::new();
        meshes.insert(Mesh);
        assert_eq!(meshes.drain().count(), 1);
        let next = meshes.insert(Mesh);
        assert_eq!(next.raw(), 2);
    }

    #[test]
    fn invalid_handle_resolves_to_nothing() {
        let mut meshes = ResourceMap::new();
        meshes.insert(Mesh);
        let invalid: Handle<Mesh> = Handle::default();
        assert!(!invalid.is_valid());
        assert!(meshes.get(invalid).is_none());
    }

    #[test]
    fn named_lookup() {
        let mut textures = ResourceMap::new();
        let handle = textures.insert_named("white", Texture);
        assert_eq!(textures.find("white"), handle);
        assert!(!textures.find("missing").is_valid());
    }
}
