//! Pipeline builder for wiring capture sources, decoders and sinks
//!
//! Nodes are added by name; connections are checked by port name and type
//! at `connect()` time, so stacking a decoder on an incompatible output
//! fails before any thread starts.

use super::errors::ConnectionError;
use super::node::{InputPort, OutputPort, ProcessNode};
use super::ports::PortSchema;
use super::scheduler::Scheduler;
use super::type_registry::TYPE_REGISTRY;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::{debug, info};

const DEFAULT_BUFFER_SIZE: usize = 64;

/// Pipeline builder that manages nodes and connections
pub struct Pipeline {
    nodes: Vec<(usize, Box<dyn ProcessNode>)>,
    node_names: HashMap<String, usize>,
    node_schemas: HashMap<usize, (Vec<PortSchema>, Vec<PortSchema>)>,
    connections: Vec<PendingConnection>,
    next_id: usize,
    default_buffer_size: usize,
}

struct PendingConnection {
    from_node: usize,
    from_port: usize,
    to_node: usize,
    to_port: usize,
    type_id: TypeId,
    buffer_size: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_names: HashMap::new(),
            node_schemas: HashMap::new(),
            connections: Vec::new(),
            next_id: 0,
            default_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the default buffer size for connections
    pub fn with_default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size.max(1);
        self
    }

    /// Add a node under a unique name. Ports come from the node's schemas.
    pub fn add_process<N: ProcessNode + 'static>(&mut self, name: impl Into<String>, node: N) -> Result<(), String> {
        let name = name.into();

        if self.node_names.contains_key(&name) {
            return Err(format!("Node with name '{}' already exists", name));
        }

        let id = self.next_id;
        self.next_id += 1;

        self.node_schemas
            .insert(id, (node.input_schema(), node.output_schema()));
        self.node_names.insert(name, id);
        self.nodes.push((id, Box::new(node)));

        Ok(())
    }

    /// Connect an output port of one node to an input port of another
    pub fn connect(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Result<(), Box<ConnectionError>> {
        self.connect_with_buffer(from_node, from_port, to_node, to_port, self.default_buffer_size)
    }

    /// Connect with custom buffer size
    pub fn connect_with_buffer(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
        buffer_size: usize,
    ) -> Result<(), Box<ConnectionError>> {
        let from_id = self.node_id(from_node)?;
        let to_id = self.node_id(to_node)?;

        let from_schema = self.schemas(from_id).1.iter().find(|s| s.name == from_port).ok_or_else(|| {
            Box::new(ConnectionError::PortNotFound {
                node: from_node.to_string(),
                port: from_port.to_string(),
            })
        })?;

        let to_schema = self.schemas(to_id).0.iter().find(|s| s.name == to_port).ok_or_else(|| {
            Box::new(ConnectionError::PortNotFound {
                node: to_node.to_string(),
                port: to_port.to_string(),
            })
        })?;

        if from_schema.type_id != to_schema.type_id {
            return Err(Box::new(ConnectionError::TypeMismatch {
                from_node: from_node.to_string(),
                from_port: from_port.to_string(),
                from_type: from_schema.type_id,
                to_node: to_node.to_string(),
                to_port: to_port.to_string(),
                to_type: to_schema.type_id,
            }));
        }

        if self
            .connections
            .iter()
            .any(|c| c.to_node == to_id && c.to_port == to_schema.index)
        {
            return Err(Box::new(ConnectionError::DuplicateConnection(format!(
                "Input port '{}' on node '{}' is already connected",
                to_port, to_node
            ))));
        }

        debug!(
            "Connecting {}.{} -> {}.{} ({})",
            from_node, from_port, to_node, to_port, from_schema.type_name
        );

        let connection = PendingConnection {
            from_node: from_id,
            from_port: from_schema.index,
            to_node: to_id,
            to_port: to_schema.index,
            type_id: from_schema.type_id,
            buffer_size: buffer_size.max(1),
        };
        self.connections.push(connection);

        Ok(())
    }

    fn node_id(&self, name: &str) -> Result<usize, Box<ConnectionError>> {
        self.node_names
            .get(name)
            .copied()
            .ok_or_else(|| Box::new(ConnectionError::NodeNotFound(name.to_string())))
    }

    fn schemas(&self, id: usize) -> &(Vec<PortSchema>, Vec<PortSchema>) {
        // Every id handed out by add_process has a schema entry
        &self.node_schemas[&id]
    }

    /// List all input ports for a node by name
    pub fn list_node_inputs(&self, name: &str) -> Result<&[PortSchema], String> {
        let id = self
            .node_names
            .get(name)
            .ok_or_else(|| format!("Node '{}' not found", name))?;
        Ok(self.schemas(*id).0.as_slice())
    }

    /// List all output ports for a node by name
    pub fn list_node_outputs(&self, name: &str) -> Result<&[PortSchema], String> {
        let id = self
            .node_names
            .get(name)
            .ok_or_else(|| format!("Node '{}' not found", name))?;
        Ok(self.schemas(*id).1.as_slice())
    }

    /// List all node names
    pub fn list_nodes(&self) -> Vec<&str> {
        self.node_names.keys().map(|s| s.as_str()).collect()
    }

    /// Build the pipeline and start every node on its own thread
    pub fn build(mut self) -> Result<Scheduler, String> {
        info!(
            "Building pipeline with {} nodes and {} connections",
            self.nodes.len(),
            self.connections.len()
        );

        let registry = TYPE_REGISTRY
            .lock()
            .map_err(|_| "Type registry poisoned".to_string())?;

        // Phase 1: create all channels before any thread starts
        type PortKey = (usize, usize);
        let mut receivers: HashMap<PortKey, Box<dyn Any + Send>> = HashMap::new();
        let mut senders: HashMap<PortKey, (TypeId, Vec<Box<dyn Any + Send>>)> = HashMap::new();

        for conn in &self.connections {
            let (tx, rx) = registry.create_channel(conn.type_id, conn.buffer_size).ok_or_else(|| {
                format!(
                    "Type {:?} not registered. Call register_type::<T>() before building pipeline.",
                    conn.type_id
                )
            })?;

            receivers.insert((conn.to_node, conn.to_port), rx);
            senders
                .entry((conn.from_node, conn.from_port))
                .or_insert_with(|| (conn.type_id, Vec::new()))
                .1
                .push(tx);
        }

        // Phase 2: wrap ports with watchdog context
        let scheduler = Scheduler::new();
        let watchdog = scheduler.watchdog().clone();
        let mut port_sets = Vec::with_capacity(self.nodes.len());
        for (node_id, node) in &self.nodes {
            let node_name = node.name().to_string();
            let (input_schemas, output_schemas) = self.schemas(*node_id);

            // Unconnected inputs are allowed; the node sees `is_connected() == false`
            let input_ports: Vec<InputPort> = (0..node.num_inputs())
                .map(|i| {
                    let channel = receivers
                        .remove(&(*node_id, i))
                        .unwrap_or_else(|| Box::new(()) as Box<dyn Any + Send>);
                    let port_name = input_schemas
                        .get(i)
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| format!("in{}", i));
                    InputPort::from_type_erased(channel).with_watchdog(&watchdog, &node_name, &port_name)
                })
                .collect();

            // Unconnected outputs are allowed; nodes skip them when sending
            let output_ports = (0..node.num_outputs())
                .map(|i| {
                    let channel = match senders.remove(&(*node_id, i)) {
                        Some((type_id, sender_list)) => registry.wrap_output(type_id, sender_list)?,
                        None => Box::new(()) as Box<dyn Any + Send>,
                    };
                    let port_name = output_schemas
                        .get(i)
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| format!("out{}", i));
                    Ok(OutputPort::from_type_erased(channel).with_watchdog(&watchdog, &node_name, &port_name))
                })
                .collect::<Result<Vec<_>, String>>();

            match output_ports {
                Ok(output_ports) => port_sets.push((input_ports, output_ports)),
                Err(e) => {
                    watchdog.stop();
                    return Err(e);
                }
            }
        }
        drop(registry);

        // Phase 3: start every node only once all ports are wired
        let mut scheduler = scheduler;
        for ((node_id, node), (inputs, outputs)) in self.nodes.drain(..).zip(port_sets) {
            debug!("Starting node {}: {}", node_id, node.name());
            scheduler.start_process(node, inputs, outputs);
        }

        info!("Pipeline built successfully with {} threads", scheduler.num_threads());
        Ok(scheduler)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
