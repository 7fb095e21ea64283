//! Type registry for dynamic channel creation
//!
//! The pipeline only knows port `TypeId`s at build time, so each streamable
//! type registers a channel constructor and an output wrapper here.

use super::sender::{ChannelMessage, Sender};
use crossbeam_channel::{Sender as CrossbeamSender, bounded};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;

type ErasedEndpoint = Box<dyn Any + Send>;
type ChannelCreatorFn = Box<dyn Fn(usize) -> (ErasedEndpoint, ErasedEndpoint) + Send + Sync>;
type OutputWrapperFn = Box<dyn Fn(Vec<ErasedEndpoint>) -> Result<ErasedEndpoint, String> + Send + Sync>;

pub(crate) struct TypeRegistry {
    channel_creators: HashMap<TypeId, ChannelCreatorFn>,
    output_wrappers: HashMap<TypeId, OutputWrapperFn>,
}

impl TypeRegistry {
    fn new() -> Self {
        Self {
            channel_creators: HashMap::new(),
            output_wrappers: HashMap::new(),
        }
    }

    fn register<T: 'static + Send + Clone>(&mut self) {
        let type_id = TypeId::of::<T>();

        self.channel_creators.insert(
            type_id,
            Box::new(|buffer_size: usize| {
                let (tx, rx) = bounded::<ChannelMessage<T>>(buffer_size);
                (Box::new(tx) as ErasedEndpoint, Box::new(rx) as ErasedEndpoint)
            }),
        );

        self.output_wrappers.insert(
            type_id,
            Box::new(|senders: Vec<ErasedEndpoint>| {
                if senders.is_empty() {
                    return Err("No senders to wrap".to_string());
                }
                let typed_senders = senders
                    .into_iter()
                    .map(|sender| {
                        sender
                            .downcast::<CrossbeamSender<ChannelMessage<T>>>()
                            .map(|tx| *tx)
                            .map_err(|_| format!("Type mismatch in sender for {}", std::any::type_name::<T>()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(Sender::new(typed_senders)) as ErasedEndpoint)
            }),
        );
    }

    pub(crate) fn is_registered(&self, type_id: TypeId) -> bool {
        self.channel_creators.contains_key(&type_id)
    }

    pub(crate) fn create_channel(&self, type_id: TypeId, buffer_size: usize) -> Option<(ErasedEndpoint, ErasedEndpoint)> {
        self.channel_creators.get(&type_id).map(|creator| creator(buffer_size))
    }

    pub(crate) fn wrap_output(&self, type_id: TypeId, senders: Vec<ErasedEndpoint>) -> Result<ErasedEndpoint, String> {
        self.output_wrappers
            .get(&type_id)
            .ok_or_else(|| format!("Type {:?} not registered", type_id))?(senders)
    }
}

lazy_static::lazy_static! {
    pub(crate) static ref TYPE_REGISTRY: Mutex<TypeRegistry> = {
        use crate::nodes::decoders::{Annotation, BinaryRecord, MetaRecord, OneWireFrame};
        use crate::runtime::SampleBlock;

        let mut registry = TypeRegistry::new();
        registry.register::<SampleBlock>();
        registry.register::<Annotation>();
        registry.register::<BinaryRecord>();
        registry.register::<MetaRecord>();
        registry.register::<OneWireFrame>();
        Mutex::new(registry)
    };
}

/// Register a custom type for use in pipelines.
/// Call this before building pipelines that stream the type.
pub fn register_type<T: 'static + Send + Clone>() {
    TYPE_REGISTRY
        .lock()
        .expect("type registry poisoned")
        .register::<T>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct CustomFrame(u8);

    struct NeverRegistered;

    #[test]
    fn test_builtin_types_registered() {
        let registry = TYPE_REGISTRY.lock().unwrap();
        assert!(registry.is_registered(TypeId::of::<crate::runtime::SampleBlock>()));
        assert!(registry.is_registered(TypeId::of::<crate::nodes::decoders::Annotation>()));
        assert!(!registry.is_registered(TypeId::of::<NeverRegistered>()));
    }

    #[test]
    fn test_register_custom_type() {
        register_type::<CustomFrame>();
        let registry = TYPE_REGISTRY.lock().unwrap();
        let (tx, rx) = registry
            .create_channel(TypeId::of::<CustomFrame>(), 4)
            .unwrap();
        let sender = registry
            .wrap_output(TypeId::of::<CustomFrame>(), vec![tx])
            .unwrap();
        let sender = sender.downcast::<Sender<CustomFrame>>().unwrap();
        sender.send(CustomFrame(3)).unwrap();

        let rx = rx
            .downcast::<crossbeam_channel::Receiver<ChannelMessage<CustomFrame>>>()
            .unwrap();
        assert!(matches!(rx.recv().unwrap(), ChannelMessage::Sample(CustomFrame(3))));
    }
}
