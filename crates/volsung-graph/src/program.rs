//! The program: node table, symbol table, groups, subgraph recipes,
//! directives, and per-frame execution.
//!
//! A [`Program`] owns everything it runs. Nodes live in an insertion-ordered
//! table and are addressed by stable indices; channels are pure data on the
//! sink ports. Execution is single-threaded and synchronous: one call to
//! [`Program::run`] advances every node exactly one frame, in insertion
//! order, with the `output` sink always observed last so a straight-line
//! graph reaches the host without an extra frame of latency. Cycles are
//! legal; a node whose producer has not yet run this frame reads the
//! producer's previous-frame value, which is what makes delay-line feedback
//! work without a topological sort.

use std::cell::RefCell;
use std::hash::BuildHasherDefault;
use std::rc::Rc;

use indexmap::IndexMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHasher};

use volsung_util::{Error, Handler, Result};

use crate::nodes::{build_builtin, Channel, Node, NodeKind, UserCallback};
use crate::value::TypedValue;

/// One tuple of audio-rate samples; width equals the io arity.
pub type Frame = Vec<f32>;

/// Host-registered directive, invoked from source as `&name args…`.
pub type DirectiveCallback = Rc<dyn Fn(&[TypedValue], &mut Program)>;

/// Sample rate a fresh program assumes until told otherwise.
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

const INPUT_NODE: &str = "input";
const OUTPUT_NODE: &str = "output";
const GROUP_PREFIX: &str = "__grp_";

/// Synthetic node-table name of member `index` of `group`.
///
/// Group members are ordinary nodes; only the naming convention ties them
/// to their group.
///
/// # Example
///
/// ```
/// use volsung_graph::group_member_name;
///
/// assert_eq!(group_member_name("voices", 2), "__grp_voices2");
/// ```
pub fn group_member_name(group: &str, index: usize) -> String {
    format!("{GROUP_PREFIX}{group}{index}")
}

/// The five connection operator shapes.
///
/// The kind decides how many channels one statement creates; the
/// expansion itself happens in [`Program::connect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    /// `->` object to object
    OneToOne,
    /// `>>` every member of a group to one object
    ManyToOne,
    /// `<>` one object to every member of a group
    OneToMany,
    /// `=>` group to group, index by index
    ManyToMany,
    /// `x>` group to group, every pair
    Biclique,
}

/// A stored subgraph recipe: verbatim body source plus io arities.
///
/// The body is the text between the braces of `name(in, out): { … }`,
/// captured unparsed at definition time; every instantiation parses its
/// own copy into a fresh child program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubgraphDefinition {
    pub source: String,
    pub inputs: usize,
    pub outputs: usize,
}

type NodeTable = IndexMap<String, Node, BuildHasherDefault<FxHasher>>;

/// An audio graph plus its build-time environment.
///
/// A program owns everything it touches: the node table, the symbol /
/// group / subgraph / directive tables the parser populates, the sample
/// rate, its own random generator, and a shared handle on the diagnostic
/// handler. Two programs never share mutable state, so distinct programs
/// are independent even though any single program is strictly
/// single-threaded.
///
/// The usual lifecycle is [`configure_io`](Self::configure_io), then
/// [`reset`](Self::reset), then either parsing source into it or building
/// the graph by hand, then [`run`](Self::run) once per frame and
/// [`finish`](Self::finish) at shutdown.
pub struct Program {
    nodes: NodeTable,
    groups: FxHashMap<String, usize>,
    symbols: FxHashMap<String, TypedValue>,
    subgraphs: FxHashMap<String, SubgraphDefinition>,
    directives: FxHashMap<String, DirectiveCallback>,
    inputs: usize,
    outputs: usize,
    sample_rate: f32,
    rng: RefCell<SmallRng>,
    handler: Rc<Handler>,
}

impl Program {
    /// A fresh program with its own diagnostic handler.
    ///
    /// The program starts with no io and no nodes; configure it, reset
    /// it, then populate it.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::{ConnectionKind, Program};
    ///
    /// let mut program = Program::new();
    /// program.configure_io(0, 1);
    /// program.reset();
    ///
    /// program.create_node("const", "level", &[0.25.into()]).unwrap();
    /// program
    ///     .connect("level", 0, "output", 0, ConnectionKind::OneToOne)
    ///     .unwrap();
    ///
    /// assert_eq!(program.run(&[]), vec![0.25]);
    /// ```
    pub fn new() -> Self {
        Self::with_handler(Rc::new(Handler::new()))
    }

    /// A program sharing an existing diagnostic handler; used for nested
    /// subgraph programs.
    pub fn with_handler(handler: Rc<Handler>) -> Self {
        Self {
            nodes: NodeTable::default(),
            groups: FxHashMap::default(),
            symbols: FxHashMap::default(),
            subgraphs: FxHashMap::default(),
            directives: FxHashMap::default(),
            inputs: 0,
            outputs: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            rng: RefCell::new(SmallRng::from_entropy()),
            handler,
        }
    }

    // =========================================================================
    // Host configuration
    // =========================================================================

    /// Set io arities.
    ///
    /// Takes effect at the next [`reset`](Self::reset), which creates the
    /// `input` and `output` endpoint nodes for nonzero arities. The input
    /// arity is also the width of the frame [`run`](Self::run) consumes,
    /// and the output arity the width of the frame it returns.
    pub fn configure_io(&mut self, inputs: usize, outputs: usize) {
        self.inputs = inputs;
        self.outputs = outputs;
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn handler(&self) -> &Rc<Handler> {
        &self.handler
    }

    /// Replace the diagnostic sink for this program (and the subgraphs it
    /// will instantiate).
    pub fn set_diagnostic_callback(&self, callback: volsung_util::diagnostic::DiagnosticCallback) {
        self.handler.set_callback(callback);
    }

    /// Clear nodes, symbols, and groups, then recreate the `input` /
    /// `output` endpoints for nonzero arities. Subgraph recipes and
    /// registered directives survive.
    pub fn reset(&mut self) {
        log::debug!("reset: io ({}, {})", self.inputs, self.outputs);
        self.nodes.clear();
        self.symbols.clear();
        self.groups.clear();

        if self.inputs > 0 {
            self.nodes.insert(
                INPUT_NODE.to_owned(),
                Node::new(NodeKind::Input {
                    data: vec![0.0; self.inputs],
                }),
            );
        }
        if self.outputs > 0 {
            self.nodes.insert(
                OUTPUT_NODE.to_owned(),
                Node::new(NodeKind::Output {
                    data: vec![0.0; self.outputs],
                }),
            );
        }
    }

    // =========================================================================
    // Object and group construction
    // =========================================================================

    /// Create a catalog node under `name`.
    ///
    /// `type_name` accepts both the catalog's long names
    /// (`Sine_Oscillator`, `Delay_Line`, …) and their short forms
    /// (`osc`, `delay`, …); see [`is_builtin_type`](crate::is_builtin_type).
    ///
    /// # Errors
    ///
    /// [`Error::Name`] when the name is already taken or the type is
    /// unknown; [`Error::TypeMismatch`] when an argument is not a number.
    pub fn create_node(&mut self, type_name: &str, name: &str, args: &[TypedValue]) -> Result<()> {
        self.check_name_free(name)?;
        let kind = build_builtin(type_name, args)?;
        self.nodes.insert(name.to_owned(), Node::new(kind));
        Ok(())
    }

    /// Create a node whose per-frame behavior is a host callback.
    ///
    /// The callback receives the summed input ports and writes the output
    /// slots, once per frame; any state it needs rides in the closure.
    /// The object participates in source programs under its `name` like
    /// any declared node.
    pub fn create_user_object(
        &mut self,
        name: &str,
        inputs: usize,
        outputs: usize,
        callback: UserCallback,
    ) -> Result<()> {
        self.check_name_free(name)?;
        self.nodes.insert(
            name.to_owned(),
            Node::new(NodeKind::User {
                callback,
                inputs,
                outputs,
            }),
        );
        Ok(())
    }

    /// Install a fully built nested program as a subgraph node.
    ///
    /// The node's arity is the child's io configuration; each frame it
    /// forwards its input sums into the child and reads the child's
    /// output back.
    pub fn create_subgraph_node(&mut self, name: &str, program: Program) -> Result<()> {
        self.check_name_free(name)?;
        self.nodes.insert(
            name.to_owned(),
            Node::new(NodeKind::Subgraph {
                program: Box::new(program),
            }),
        );
        Ok(())
    }

    /// Record a group's cardinality. Members are separate nodes named by
    /// [`group_member_name`].
    pub fn add_group(&mut self, name: &str, size: usize) -> Result<()> {
        self.check_name_free(name)?;
        self.groups.insert(name.to_owned(), size);
        Ok(())
    }

    /// Cardinality of a declared group, if `name` is one.
    pub fn group_size(&self, name: &str) -> Option<usize> {
        self.groups.get(name).copied()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// True iff `name` is a node or a group.
    pub fn object_exists(&self, name: &str) -> bool {
        self.nodes.contains_key(name) || self.groups.contains_key(name)
    }

    /// Size of the node table, group members and endpoints included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node-table names in insertion (execution) order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    fn check_name_free(&self, name: &str) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Err(Error::Name(format!("object '{name}' already exists")));
        }
        if self.groups.contains_key(name) {
            return Err(Error::Name(format!("'{name}' already exists as a group")));
        }
        if self.symbols.contains_key(name) {
            return Err(Error::Name(format!(
                "'{name}' is already bound as a symbol"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Wire `source|out → in|sink` with the fan-out the operator implies.
    ///
    /// One-to-one joins two objects; the group-shaped kinds expand into
    /// one edge per member or per pair (see [`ConnectionKind`]). Channels
    /// are pure data on the sink's input port; nothing is allocated per
    /// frame.
    ///
    /// # Errors
    ///
    /// [`Error::Name`] when an operand is missing or is an object where a
    /// group is required (or vice versa); [`Error::Arity`] when a port
    /// index is outside the node's arity or a parallel connection joins
    /// groups of different sizes.
    pub fn connect(
        &mut self,
        source: &str,
        out: usize,
        sink: &str,
        input: usize,
        kind: ConnectionKind,
    ) -> Result<()> {
        match kind {
            ConnectionKind::OneToOne => {
                self.expect_object(source)?;
                self.expect_object(sink)?;
                self.connect_single(source, out, sink, input)
            }
            ConnectionKind::ManyToOne => {
                let size = self.expect_group(source)?;
                self.expect_object(sink)?;
                for n in 0..size {
                    self.connect_single(&group_member_name(source, n), out, sink, input)?;
                }
                Ok(())
            }
            ConnectionKind::OneToMany => {
                self.expect_object(source)?;
                let size = self.expect_group(sink)?;
                for n in 0..size {
                    self.connect_single(source, out, &group_member_name(sink, n), input)?;
                }
                Ok(())
            }
            ConnectionKind::ManyToMany => {
                let source_size = self.expect_group(source)?;
                let sink_size = self.expect_group(sink)?;
                if source_size != sink_size {
                    return Err(Error::Arity(format!(
                        "groups connected in parallel must have identical sizes, got {source_size} and {sink_size}"
                    )));
                }
                for n in 0..source_size {
                    self.connect_single(
                        &group_member_name(source, n),
                        out,
                        &group_member_name(sink, n),
                        input,
                    )?;
                }
                Ok(())
            }
            ConnectionKind::Biclique => {
                let source_size = self.expect_group(source)?;
                let sink_size = self.expect_group(sink)?;
                for a in 0..source_size {
                    for b in 0..sink_size {
                        self.connect_single(
                            &group_member_name(source, a),
                            out,
                            &group_member_name(sink, b),
                            input,
                        )?;
                    }
                }
                Ok(())
            }
        }
    }

    fn connect_single(&mut self, source: &str, out: usize, sink: &str, input: usize) -> Result<()> {
        let source_index = self
            .nodes
            .get_index_of(source)
            .ok_or_else(|| Error::Name(format!("object '{source}' has not been declared")))?;
        let sink_index = self
            .nodes
            .get_index_of(sink)
            .ok_or_else(|| Error::Name(format!("object '{sink}' has not been declared")))?;

        if out >= self.nodes[source_index].output_count() {
            return Err(Error::Arity(format!(
                "index out of range on output object '{source}': index is {out}"
            )));
        }
        if input >= self.nodes[sink_index].input_count() {
            return Err(Error::Arity(format!(
                "index out of range on input object '{sink}': index is {input}"
            )));
        }

        self.nodes[sink_index].attach(
            input,
            Channel {
                source: source_index,
                port: out,
            },
        );
        Ok(())
    }

    fn expect_object(&self, name: &str) -> Result<()> {
        if self.groups.contains_key(name) {
            Err(Error::Name(format!("'{name}' is a group, not an object")))
        } else if !self.nodes.contains_key(name) {
            Err(Error::Name(format!("object '{name}' has not been declared")))
        } else {
            Ok(())
        }
    }

    fn expect_group(&self, name: &str) -> Result<usize> {
        if self.nodes.contains_key(name) {
            Err(Error::Name(format!("'{name}' is an object, not a group")))
        } else {
            self.groups
                .get(name)
                .copied()
                .ok_or_else(|| Error::Name(format!("group '{name}' has not been declared")))
        }
    }

    /// Total number of channels in the graph.
    pub fn connection_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|node| node.incoming())
            .map(Vec::len)
            .sum()
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    /// Bind `name` in the symbol table.
    ///
    /// A name is used for at most one of symbol, node, or group at a
    /// time, and an existing symbol cannot be rebound; remove it first.
    ///
    /// # Errors
    ///
    /// [`Error::Name`] when the name is already in use in any of the
    /// three tables.
    pub fn add_symbol(&mut self, name: &str, value: TypedValue) -> Result<()> {
        if self.symbols.contains_key(name) {
            return Err(Error::Name(format!(
                "identifier '{name}' is already in use"
            )));
        }
        if self.object_exists(name) {
            return Err(Error::Name(format!(
                "identifier '{name}' already names an object or group"
            )));
        }
        self.symbols.insert(name.to_owned(), value);
        Ok(())
    }

    /// Drop a binding; removing an unbound name is a no-op.
    pub fn remove_symbol(&mut self, name: &str) {
        self.symbols.remove(name);
    }

    pub fn symbol_exists(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// The bound value, cloned out of the table.
    pub fn get_symbol_value(&self, name: &str) -> Option<TypedValue> {
        self.symbols.get(name).cloned()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    // =========================================================================
    // Subgraph recipes and directives
    // =========================================================================

    pub fn add_subgraph(&mut self, name: &str, definition: SubgraphDefinition) {
        self.subgraphs.insert(name.to_owned(), definition);
    }

    pub fn subgraph(&self, name: &str) -> Option<&SubgraphDefinition> {
        self.subgraphs.get(name)
    }

    pub fn has_subgraph(&self, name: &str) -> bool {
        self.subgraphs.contains_key(name)
    }

    /// Register a directive. Registration is idempotent: the first callback
    /// under a name wins.
    pub fn add_directive(&mut self, name: &str, callback: DirectiveCallback) {
        self.directives.entry(name.to_owned()).or_insert(callback);
    }

    pub fn invoke_directive(&mut self, name: &str, args: &[TypedValue]) -> Result<()> {
        let callback = self
            .directives
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Name(format!("unknown directive: {name}")))?;
        callback(args, self);
        Ok(())
    }

    /// Draw from this program's generator; degenerate ranges collapse to
    /// their lower bound.
    pub fn random_value(&self, min: f32, max: f32) -> f32 {
        if min < max {
            self.rng.borrow_mut().gen_range(min..max)
        } else {
            min
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run one audio frame: host samples in, one `process` per node, host
    /// samples out.
    ///
    /// Nodes execute in insertion order with the `output` sink last, so a
    /// feed-forward chain reaches the host in the same frame. A node
    /// whose producer runs later in the order reads the producer's
    /// previous-frame value instead; that one-frame lag is the feedback
    /// contract, not an error, and it is how delay-line loops close
    /// without a topological sort. The returned frame has
    /// [`outputs()`](Self::outputs) entries; a short input frame is
    /// padded with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::{ConnectionKind, Program};
    ///
    /// let mut program = Program::new();
    /// program.configure_io(1, 1);
    /// program.reset();
    /// program
    ///     .connect("input", 0, "output", 0, ConnectionKind::OneToOne)
    ///     .unwrap();
    ///
    /// assert_eq!(program.run(&[0.5]), vec![0.5]);
    /// ```
    pub fn run(&mut self, input: &[f32]) -> Frame {
        if self.inputs > 0 {
            if let Some(node) = self.nodes.get_mut(INPUT_NODE) {
                if let NodeKind::Input { data } = node.kind_mut() {
                    for (n, slot) in data.iter_mut().enumerate() {
                        *slot = input.get(n).copied().unwrap_or(0.0);
                    }
                }
            }
        }

        let output_index = self.nodes.get_index_of(OUTPUT_NODE);
        for index in 0..self.nodes.len() {
            if Some(index) == output_index {
                continue;
            }
            self.step(index);
        }
        if let Some(index) = output_index {
            self.step(index);
        }

        let mut frame = Frame::new();
        if self.outputs > 0 {
            if let Some(node) = self.nodes.get_mut(OUTPUT_NODE) {
                if let NodeKind::Output { data } = node.kind_mut() {
                    frame.extend_from_slice(data);
                    data.fill(0.0);
                }
            }
        }
        frame
    }

    /// One-in, one-out convenience wrapper over [`run`](Self::run).
    pub fn run_sample(&mut self, sample: f32) -> f32 {
        self.run(&[sample]).first().copied().unwrap_or(0.0)
    }

    fn step(&mut self, index: usize) {
        // Input sums are read before the node mutates, so producers that
        // already ran contribute this frame's value and the rest
        // contribute last frame's.
        let sums: Vec<Option<f32>> = self.nodes[index]
            .incoming()
            .iter()
            .map(|channels| {
                if channels.is_empty() {
                    None
                } else {
                    Some(
                        channels
                            .iter()
                            .map(|channel| self.nodes[channel.source].output(channel.port))
                            .sum(),
                    )
                }
            })
            .collect();

        let sample_rate = self.sample_rate;
        let mut rng = self.rng.borrow_mut();
        self.nodes[index].process(&sums, sample_rate, &mut rng);
    }

    /// Call every node's shutdown hook once.
    pub fn finish(&mut self) {
        for node in self.nodes.values_mut() {
            node.finish();
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(inputs: usize, outputs: usize) -> Program {
        let mut program = Program::new();
        program.configure_io(inputs, outputs);
        program.reset();
        program
    }

    #[test]
    fn reset_leaves_only_the_io_endpoints() {
        let mut program = fresh(2, 1);
        program.create_node("osc", "tone", &[]).unwrap();
        program.add_group("bank", 4).unwrap();
        program.add_symbol("gain", 0.5.into()).unwrap();

        program.reset();
        assert!(program.object_exists("input"));
        assert!(program.object_exists("output"));
        assert_eq!(program.node_count(), 2);
        assert_eq!(program.group_count(), 0);
        assert_eq!(program.symbol_count(), 0);
    }

    #[test]
    fn zero_arity_reset_creates_no_endpoints() {
        let program = fresh(0, 0);
        assert!(!program.object_exists("input"));
        assert!(!program.object_exists("output"));
    }

    #[test]
    fn names_are_unique_across_nodes_groups_and_symbols() {
        let mut program = fresh(0, 0);
        program.create_node("osc", "voice", &[]).unwrap();
        assert!(program.add_symbol("voice", 1.0.into()).is_err());
        assert!(program.add_group("voice", 3).is_err());

        program.add_symbol("depth", 2.0.into()).unwrap();
        assert!(program.create_node("osc", "depth", &[]).is_err());
    }

    #[test]
    fn direct_wire_from_input_to_output_is_latency_free() {
        let mut program = fresh(1, 1);
        program
            .connect("input", 0, "output", 0, ConnectionKind::OneToOne)
            .unwrap();
        assert_eq!(program.run(&[0.5]), vec![0.5]);
        assert_eq!(program.run_sample(0.25), 0.25);
    }

    #[test]
    fn fan_in_sums_at_the_input_port() {
        let mut program = fresh(0, 1);
        program.create_node("const", "a", &[2.0.into()]).unwrap();
        program.create_node("const", "b", &[3.0.into()]).unwrap();
        program
            .connect("a", 0, "output", 0, ConnectionKind::OneToOne)
            .unwrap();
        program
            .connect("b", 0, "output", 0, ConnectionKind::OneToOne)
            .unwrap();
        assert_eq!(program.run(&[]), vec![5.0]);
    }

    #[test]
    fn output_scratch_clears_between_frames() {
        let mut program = fresh(1, 1);
        program
            .connect("input", 0, "output", 0, ConnectionKind::OneToOne)
            .unwrap();
        assert_eq!(program.run(&[1.0]), vec![1.0]);
        // A disconnected frame would otherwise replay the stale value.
        assert_eq!(program.run(&[0.0]), vec![0.0]);
    }

    #[test]
    fn parallel_connection_makes_one_edge_per_pair() {
        let mut program = fresh(0, 0);
        for n in 0..3 {
            program
                .create_node("const", &group_member_name("left", n), &[1.0.into()])
                .unwrap();
            program
                .create_node("add", &group_member_name("right", n), &[])
                .unwrap();
        }
        program.add_group("left", 3).unwrap();
        program.add_group("right", 3).unwrap();

        program
            .connect("left", 0, "right", 0, ConnectionKind::ManyToMany)
            .unwrap();
        assert_eq!(program.connection_count(), 3);
    }

    #[test]
    fn parallel_connection_rejects_mismatched_sizes() {
        let mut program = fresh(0, 0);
        for n in 0..2 {
            program
                .create_node("const", &group_member_name("left", n), &[])
                .unwrap();
        }
        for n in 0..3 {
            program
                .create_node("add", &group_member_name("right", n), &[])
                .unwrap();
        }
        program.add_group("left", 2).unwrap();
        program.add_group("right", 3).unwrap();

        assert!(matches!(
            program.connect("left", 0, "right", 0, ConnectionKind::ManyToMany),
            Err(Error::Arity(_))
        ));
    }

    #[test]
    fn biclique_makes_the_full_product_of_edges() {
        let mut program = fresh(0, 0);
        for n in 0..2 {
            program
                .create_node("const", &group_member_name("left", n), &[])
                .unwrap();
        }
        for n in 0..3 {
            program
                .create_node("add", &group_member_name("right", n), &[])
                .unwrap();
        }
        program.add_group("left", 2).unwrap();
        program.add_group("right", 3).unwrap();

        program
            .connect("left", 0, "right", 0, ConnectionKind::Biclique)
            .unwrap();
        assert_eq!(program.connection_count(), 6);
    }

    #[test]
    fn object_group_confusion_is_a_name_error() {
        let mut program = fresh(0, 0);
        program.create_node("osc", "solo", &[]).unwrap();
        assert!(matches!(
            program.connect("solo", 0, "solo", 0, ConnectionKind::ManyToOne),
            Err(Error::Name(_))
        ));
    }

    #[test]
    fn port_out_of_range_is_an_arity_error() {
        let mut program = fresh(0, 1);
        program.create_node("osc", "tone", &[]).unwrap();
        assert!(matches!(
            program.connect("tone", 3, "output", 0, ConnectionKind::OneToOne),
            Err(Error::Arity(_))
        ));
        assert!(matches!(
            program.connect("tone", 0, "output", 7, ConnectionKind::OneToOne),
            Err(Error::Arity(_))
        ));
    }

    #[test]
    fn user_objects_run_the_host_callback_each_frame() {
        let mut program = fresh(1, 1);
        program
            .create_user_object(
                "invert",
                1,
                1,
                Box::new(|inputs, outputs| outputs[0] = -inputs[0]),
            )
            .unwrap();
        program
            .connect("input", 0, "invert", 0, ConnectionKind::OneToOne)
            .unwrap();
        program
            .connect("invert", 0, "output", 0, ConnectionKind::OneToOne)
            .unwrap();
        assert_eq!(program.run(&[0.75]), vec![-0.75]);
    }

    #[test]
    fn delay_feedback_cycle_decays() {
        // input -> add -> output, with add's result fed back through a
        // one-sample delay and halved.
        let mut program = fresh(1, 1);
        program.create_node("add", "mix", &[]).unwrap();
        program.create_node("delay", "loop", &[1.0.into()]).unwrap();
        program.create_node("mult", "half", &[0.5.into()]).unwrap();

        program
            .connect("input", 0, "mix", 0, ConnectionKind::OneToOne)
            .unwrap();
        program
            .connect("mix", 0, "loop", 0, ConnectionKind::OneToOne)
            .unwrap();
        program
            .connect("loop", 0, "half", 0, ConnectionKind::OneToOne)
            .unwrap();
        program
            .connect("half", 0, "mix", 1, ConnectionKind::OneToOne)
            .unwrap();
        program
            .connect("mix", 0, "output", 0, ConnectionKind::OneToOne)
            .unwrap();

        // Impulse at frame 0. The half node executes before the delay
        // refills it, so each echo takes two frames to come around and is
        // half the previous one.
        assert_eq!(program.run_sample(1.0), 1.0);
        let echoes: Vec<f32> = (0..4).map(|_| program.run_sample(0.0)).collect();
        assert_eq!(echoes, vec![0.0, 0.5, 0.0, 0.25]);
    }

    #[test]
    fn directives_are_idempotent_and_reach_the_callback() {
        use std::cell::Cell;

        let seen = Rc::new(Cell::new(0.0f32));
        let first = Rc::clone(&seen);

        let mut program = fresh(0, 0);
        program.add_directive(
            "config",
            Rc::new(move |args, _| first.set(args[0].number().unwrap().re())),
        );
        // Second registration under the same name is ignored.
        program.add_directive("config", Rc::new(|_, _| panic!("shadowed directive ran")));

        program.invoke_directive("config", &[4.0.into()]).unwrap();
        assert_eq!(seen.get(), 4.0);

        assert!(matches!(
            program.invoke_directive("missing", &[]),
            Err(Error::Name(_))
        ));
    }

    #[test]
    fn random_values_respect_their_range() {
        let program = fresh(0, 0);
        for _ in 0..32 {
            let value = program.random_value(2.0, 3.0);
            assert!((2.0..3.0).contains(&value));
        }
        assert_eq!(program.random_value(5.0, 5.0), 5.0);
    }
}
