use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Runtime-tunable values, one named map per value type.
///
/// Owned by the application and handed to whatever needs it.
#[derive(Debug, Default, Clone)]
pub struct ConsoleVariables {
    floats: BTreeMap<String, f32>,
    ints: BTreeMap<String, i32>,
    bools: BTreeMap<String, bool>,
    strings: BTreeMap<String, String>,
}

/// Value types [`ConsoleVariables`] can store
pub trait CVarValue: Clone + Sized {
    fn map(vars: &ConsoleVariables) -> &BTreeMap<String, Self>;
    fn map_mut(vars: &mut ConsoleVariables) -> &mut BTreeMap<String, Self>;
}

macro_rules! impl_cvar_value {
    ($ty:ty, $field:ident) => {
        impl CVarValue for $ty {
            fn map(vars: &ConsoleVariables) -> &BTreeMap<String, Self> {
                &vars.$field
            }

            fn map_mut(vars: &mut ConsoleVariables) -> &mut BTreeMap<String, Self> {
                &mut vars.$field
            }
        }
    };
}

impl_cvar_value!(f32, floats);
impl_cvar_value!(i32, ints);
impl_cvar_value!(bool, bools);
impl_cvar_value!(String, strings);

impl ConsoleVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: CVarValue>(&self, name: &str) -> Option<T> {
        T::map(self).get(name).cloned()
    }

    pub fn set<T: CVarValue>(&mut self, name: &str, value: T) {
        T::map_mut(self).insert(name.to_owned(), value);
    }

    /// Visit every variable of type `T` in name order
    pub fn for_each<T: CVarValue>(&self, mut f: impl FnMut(&str, &T)) {
        for (name, value) in T::map(self) {
            f(name, value);
        }
    }
}

/// A variable bound by name. Registering it stores the initial value.
#[derive(Debug, Clone)]
pub struct CVar<T: CVarValue> {
    name: String,
    _marker: PhantomData<T>,
}

impl<T: CVarValue> CVar<T> {
    pub fn register(vars: &mut ConsoleVariables, name: &str, initial: T) -> Self {
        vars.set(name, initial);
        Self::bind(name)
    }

    /// Refer to a variable registered elsewhere
    pub fn bind(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Panics when the variable was never registered in `vars`
    pub fn get(&self, vars: &ConsoleVariables) -> T {
        vars.get(&self.name)
            .unwrap_or_else(|| panic!("Console variable {} is not registered", self.name))
    }

    pub fn set(&self, vars: &mut ConsoleVariables, value: T) {
        vars.set(&self.name, value);
    }
}
