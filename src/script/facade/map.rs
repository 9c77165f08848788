//! String-keyed map facade.

use std::any::Any;
use std::ops::Bound;

use crate::map::{self, Shared};
use crate::script::value::{HostValue, Key, PropertyBag};
use crate::script::wrapper::{Field, Wrapper, WrapperKind};
use crate::{BridgeError, Result};

/// Read/write view over a shared text-keyed map.
pub struct MapWrapper {
    map: Shared<PropertyBag>,
}

impl MapWrapper {
    pub fn new(map: Shared<PropertyBag>) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &Shared<PropertyBag> {
        &self.map
    }
}

impl Wrapper for MapWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::Map
    }

    fn identity(&self) -> usize {
        map::identity(&self.map)
    }

    fn get(&self, key: &Key) -> Field {
        let value = key
            .as_str()
            .and_then(|name| self.map.borrow().get(name).cloned());
        Field::Value(value.unwrap_or_default())
    }

    fn set(&self, key: &Key, value: HostValue) -> Result<()> {
        let name = key.as_str().ok_or_else(|| {
            BridgeError::Validation(format!("map keys must be text, got {key}"))
        })?;
        if value.holds_wrapper() {
            return Err(BridgeError::Validation(format!(
                "'{name}' cannot hold a wrapper handle: {value}"
            )));
        }
        let mut map = self.map.borrow_mut();
        if value.is_nil() {
            map.remove(name);
        } else {
            map.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.borrow().len()
    }

    fn next(&self, after: Option<&Key>) -> Option<(Key, Field)> {
        let map = self.map.borrow();
        let entry = match after {
            None => map.iter().next(),
            Some(prev) => {
                let name = prev.as_str()?;
                map.range::<str, _>((Bound::Excluded(name), Bound::Unbounded))
                    .next()
            }
        };
        entry.map(|(name, value)| (Key::named(name), Field::Value(value.clone())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::shared;

    fn bag() -> Shared<PropertyBag> {
        let mut map = PropertyBag::new();
        map.insert("b".into(), HostValue::Int(2));
        map.insert("a".into(), HostValue::Int(1));
        map.insert("x".into(), HostValue::Int(9));
        shared(map)
    }

    #[test]
    fn test_read_write() {
        let map = bag();
        let wrapper = MapWrapper::new(map.clone());

        assert!(matches!(wrapper.get(&Key::named("a")), Field::Value(HostValue::Int(1))));
        assert!(matches!(wrapper.get(&Key::X), Field::Value(HostValue::Int(9))));

        wrapper.set(&Key::named("c"), HostValue::Bool(true)).unwrap();
        wrapper.set(&Key::named("a"), HostValue::Nil).unwrap();
        assert_eq!(map.borrow().len(), 3);
        assert!(map.borrow().get("a").is_none());
        assert!(wrapper.set(&Key::Index(1), HostValue::Int(0)).is_err());
    }

    #[test]
    fn test_wrapper_handles_refused() {
        let map = bag();
        let wrapper = MapWrapper::new(map.clone());
        let mut registry = crate::script::registry::WrapperRegistry::new();
        let handle = registry.register(std::rc::Rc::new(MapWrapper::new(bag())));

        let err = wrapper.set(&Key::named("link"), HostValue::Wrapper(handle)).unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        assert!(map.borrow().get("link").is_none());
    }

    #[test]
    fn test_iteration_natural_order() {
        let wrapper = MapWrapper::new(bag());
        let mut seen = Vec::new();
        let mut cursor = None;
        while let Some((key, _)) = wrapper.next(cursor.as_ref()) {
            seen.push(key.to_string());
            cursor = Some(key);
        }
        assert_eq!(seen, vec!["a", "b", "x"]);
    }

    #[test]
    fn test_iteration_resumes_after_removed_key() {
        let map = bag();
        let wrapper = MapWrapper::new(map.clone());

        let (first, _) = wrapper.next(None).unwrap();
        map.borrow_mut().remove("a");
        let (second, _) = wrapper.next(Some(&first)).unwrap();
        assert_eq!(second, Key::named("b"));
    }
}
