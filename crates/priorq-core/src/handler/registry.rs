use std::collections::HashMap;
use std::sync::Arc;

use super::TaskHandler;
use crate::domain::{TaskType, UnknownTaskType};

/// Task type -> handler. Registering a type twice replaces the old handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler that was replaced, if any.
    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.insert(task_type, handler)
    }

    /// Like [`register`](Self::register) but keyed by a string tag.
    pub fn register_named(
        &mut self,
        tag: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Option<Arc<dyn TaskHandler>>, UnknownTaskType> {
        let task_type = tag.parse::<TaskType>()?;
        Ok(self.register(task_type, handler))
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskParams;
    use crate::handler::{HandlerError, handler_fn};
    use serde_json::json;

    fn constant(v: i64) -> Arc<dyn TaskHandler> {
        handler_fn(move |_params| async move { Ok::<_, HandlerError>(json!(v)) })
    }

    #[test]
    fn register_and_get() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.register(TaskType::Analysis, constant(1)).is_none());
        assert!(registry.get(TaskType::Analysis).is_some());
        assert!(registry.get(TaskType::Validation).is_none());
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register(TaskType::Computational, constant(1));
        let replaced = registry.register(TaskType::Computational, constant(2));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);

        let handler = registry.get(TaskType::Computational).unwrap();
        assert_eq!(handler.handle(TaskParams::new()).await.unwrap(), json!(2));
    }

    #[test]
    fn named_registration_validates_the_tag() {
        let mut registry = HandlerRegistry::new();
        registry.register_named("Processing", constant(0)).unwrap();
        let err = registry.register_named("teleport", constant(0)).err().unwrap();
        assert_eq!(err, UnknownTaskType("teleport".into()));
        assert_eq!(registry.registered_types(), vec![TaskType::Processing]);
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register(TaskType::Communication, constant(0));
        registry.register(TaskType::Computational, constant(0));
        assert_eq!(
            registry.registered_types(),
            vec![TaskType::Computational, TaskType::Communication]
        );
    }
}
