//! The scope arena: layered variable/constant/function environments with a
//! construct/collect lifecycle.
//!
//! Scopes form an owned tree inside [`Scopes`]; children hold their parent's
//! *index*, never a pointer, so collecting a scope cannot leave a keep-alive
//! cycle behind.  A collected scope stays in the arena as a tombstone and
//! rejects every further operation with [`BasicError::ContextCollected`].
//! The root scope can never be collected: collecting it is a no-op that
//! returns its own id.
//!
//! All maps are keyed case-insensitively through [`canon`], normalized once
//! at registration and lookup.

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};
use serde::Serialize;

use crate::block::Node;
use crate::error::{BasicError, Result};
use crate::exec::{Runtime, StackFrame};
use crate::ops::canon;
use crate::value::Value;

/// Index of a scope inside the arena.  Cheap to copy, safe to store inside a
/// [`Value::Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeId(usize);

impl ScopeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Declared argument count of a registered native command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Unbounded,
}

/// Native entry point: receives the runtime and the per-invocation call
/// frame (arguments, status code, return slot).
pub type NativeFn = fn(&mut Runtime, &mut StackFrame) -> Result<()>;

/// Registration record for a native command.
#[derive(Clone, Copy)]
pub struct NativeCommand {
    pub arity: Arity,
    /// When false the native receives each argument as its raw source text
    /// instead of an evaluated value.
    pub pre_eval: bool,
    pub native: NativeFn,
}

/// A user-defined function: parsed once at load, executed many times.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Vec<Node>>,
    pub line: usize,
}

/// A class prototype: field-initializer statements plus member functions,
/// with an optional parent class by name.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub initializers: Rc<Vec<Node>>,
    pub methods: Vec<FunctionDef>,
    pub line: usize,
}

struct ScopeNode {
    parent: Option<ScopeId>,
    collected: bool,
    variables: HashMap<String, Value>,
    constants: HashMap<String, Value>,
    functions: HashMap<String, FunctionDef>,
    commands: HashMap<String, NativeCommand>,
    classes: HashMap<String, ClassDef>,
}

impl ScopeNode {
    fn new(parent: Option<ScopeId>) -> Self {
        Self {
            parent,
            collected: false,
            variables: HashMap::new(),
            constants: HashMap::new(),
            functions: HashMap::new(),
            commands: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}

/// The arena owning every scope of one runtime.
pub struct Scopes {
    nodes: Vec<ScopeNode>,
}

impl Scopes {
    /// Create the arena with its root scope already in place.
    pub fn new() -> Self {
        info!("Creating scope arena with root scope");

        Self {
            nodes: vec![ScopeNode::new(None)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    fn node(&self, id: ScopeId) -> Result<&ScopeNode> {
        let node = &self.nodes[id.0];
        if node.collected {
            return Err(BasicError::ContextCollected);
        }
        Ok(node)
    }

    fn node_mut(&mut self, id: ScopeId) -> Result<&mut ScopeNode> {
        let node = &mut self.nodes[id.0];
        if node.collected {
            return Err(BasicError::ContextCollected);
        }
        Ok(node)
    }

    /// Create a child scope.  The child shares the runtime's operator tables
    /// by construction; nothing is copied.
    pub fn create_sub_context(&mut self, parent: ScopeId) -> Result<ScopeId> {
        self.node(parent)?;

        let id = ScopeId(self.nodes.len());
        self.nodes.push(ScopeNode::new(Some(parent)));

        debug!("Created scope #{} under #{}", id.0, parent.0);

        Ok(id)
    }

    /// Tear a scope down: clear its local maps and return its parent.
    /// Collecting the root is a no-op returning the root itself.
    pub fn collect(&mut self, id: ScopeId) -> Result<ScopeId> {
        let node = self.node_mut(id)?;

        let Some(parent) = node.parent else {
            debug!("Collect on root scope is a no-op");
            return Ok(id);
        };

        node.collected = true;
        node.variables.clear();
        node.constants.clear();
        node.functions.clear();
        node.commands.clear();
        node.classes.clear();

        debug!("Collected scope #{}, current is #{}", id.0, parent.0);

        Ok(parent)
    }

    // ───────────────────────── variables / constants ─────────────────────

    /// Nearest definition wins: local constants, then local variables, then
    /// the parent chain.  Undefined at the root is an error.
    pub fn get_variable(&self, id: ScopeId, name: &str) -> Result<Value> {
        self.try_get_variable(id, name)?
            .ok_or_else(|| BasicError::UndefinedObject(name.to_string()))
    }

    pub fn try_get_variable(&self, id: ScopeId, name: &str) -> Result<Option<Value>> {
        let key = canon(name);
        let mut current = Some(id);

        while let Some(scope) = current {
            let node = self.node(scope)?;
            if let Some(v) = node.constants.get(&key) {
                return Ok(Some(v.clone()));
            }
            if let Some(v) = node.variables.get(&key) {
                return Ok(Some(v.clone()));
            }
            current = node.parent;
        }

        Ok(None)
    }

    /// Always writes the *local* map; this is the shadowing mechanism.
    /// A name bound as a local constant rejects the write.
    pub fn set_variable(&mut self, id: ScopeId, name: &str, value: Value) -> Result<()> {
        debug!("Scope #{}: set {} = {}", id.0, name, value);

        let key = canon(name);
        let node = self.node_mut(id)?;

        if node.constants.contains_key(&key) {
            return Err(BasicError::ConstantRedefined(name.to_string()));
        }
        node.variables.insert(key, value);
        Ok(())
    }

    /// Write-once local constant.
    pub fn set_constant(&mut self, id: ScopeId, name: &str, value: Value) -> Result<()> {
        let key = canon(name);
        let node = self.node_mut(id)?;

        if node.constants.contains_key(&key) {
            return Err(BasicError::ConstantRedefined(name.to_string()));
        }
        node.constants.insert(key, value);
        Ok(())
    }

    // ─────────────────────────── array access ────────────────────────────

    /// Walk nested arrays by successive integer indices.  Arrays never grow
    /// on read.
    pub fn get_array_at(&self, id: ScopeId, name: &str, indices: &[usize]) -> Result<Value> {
        let value = self.get_variable(id, name)?;
        let mut current = &value;

        for &index in indices {
            let Value::Array(items) = current else {
                return Err(BasicError::IndexUnavailable(name.to_string()));
            };
            current = items
                .get(index)
                .ok_or_else(|| BasicError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                })?;
        }

        Ok(current.clone())
    }

    /// Overwrite an existing slot.  Mutates the array in the nearest scope
    /// that defines the variable; never grows the array.
    pub fn set_array_at(
        &mut self,
        id: ScopeId,
        name: &str,
        indices: &[usize],
        value: Value,
    ) -> Result<()> {
        let key = canon(name);

        // Locate the owning scope first; the borrow below must be local.
        let mut owner = None;
        let mut current = Some(id);
        while let Some(scope) = current {
            let node = self.node(scope)?;
            if node.constants.contains_key(&key) {
                return Err(BasicError::ConstantRedefined(name.to_string()));
            }
            if node.variables.contains_key(&key) {
                owner = Some(scope);
                break;
            }
            current = node.parent;
        }
        let owner = owner.ok_or_else(|| BasicError::UndefinedObject(name.to_string()))?;

        let mut slot = self.nodes[owner.0]
            .variables
            .get_mut(&key)
            .expect("owning scope verified above");

        for &index in indices {
            let Value::Array(items) = slot else {
                return Err(BasicError::IndexUnavailable(name.to_string()));
            };
            if index >= items.len() {
                return Err(BasicError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                });
            }
            slot = &mut items[index];
        }

        *slot = value;
        Ok(())
    }

    // ───────────────────────────── registries ────────────────────────────

    pub fn define_function(&mut self, id: ScopeId, def: FunctionDef) -> Result<()> {
        debug!("Scope #{}: define function {}", id.0, def.name);

        self.node_mut(id)?.functions.insert(canon(&def.name), def);
        Ok(())
    }

    /// Function dispatch walks local to global, unlike variables which
    /// shadow per scope.
    pub fn lookup_function(&self, id: ScopeId, name: &str) -> Result<Option<FunctionDef>> {
        let key = canon(name);
        let mut current = Some(id);

        while let Some(scope) = current {
            let node = self.node(scope)?;
            if let Some(def) = node.functions.get(&key) {
                return Ok(Some(def.clone()));
            }
            current = node.parent;
        }

        Ok(None)
    }

    pub fn define_command(&mut self, id: ScopeId, name: &str, command: NativeCommand) -> Result<()> {
        debug!("Scope #{}: define command {}", id.0, name);

        self.node_mut(id)?.commands.insert(canon(name), command);
        Ok(())
    }

    pub fn lookup_command(&self, id: ScopeId, name: &str) -> Result<Option<NativeCommand>> {
        let key = canon(name);
        let mut current = Some(id);

        while let Some(scope) = current {
            let node = self.node(scope)?;
            if let Some(cmd) = node.commands.get(&key) {
                return Ok(Some(*cmd));
            }
            current = node.parent;
        }

        Ok(None)
    }

    /// True when `name` resolves to either a user function or a native
    /// command; used to tell "malformed function call" apart from "invalid
    /// expression".
    pub fn is_callable(&self, id: ScopeId, name: &str) -> bool {
        matches!(self.lookup_function(id, name), Ok(Some(_)))
            || matches!(self.lookup_command(id, name), Ok(Some(_)))
    }

    pub fn define_class(&mut self, id: ScopeId, def: ClassDef) -> Result<()> {
        debug!("Scope #{}: define class {}", id.0, def.name);

        self.node_mut(id)?.classes.insert(canon(&def.name), def);
        Ok(())
    }

    pub fn lookup_class(&self, id: ScopeId, name: &str) -> Result<Option<ClassDef>> {
        let key = canon(name);
        let mut current = Some(id);

        while let Some(scope) = current {
            let node = self.node(scope)?;
            if let Some(def) = node.classes.get(&key) {
                return Ok(Some(def.clone()));
            }
            current = node.parent;
        }

        Ok(None)
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes.set_variable(root, "x", Value::Number(1.0)).unwrap();

        let child = scopes.create_sub_context(root).unwrap();
        assert_eq!(scopes.get_variable(child, "x").unwrap(), Value::Number(1.0));

        // Case-insensitive.
        assert_eq!(scopes.get_variable(child, "X").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn set_writes_local_and_shadows() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes.set_variable(root, "x", Value::Number(1.0)).unwrap();

        let child = scopes.create_sub_context(root).unwrap();
        scopes.set_variable(child, "x", Value::Number(2.0)).unwrap();

        assert_eq!(scopes.get_variable(child, "x").unwrap(), Value::Number(2.0));
        assert_eq!(scopes.get_variable(root, "x").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn collected_scope_rejects_use() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        let child = scopes.create_sub_context(root).unwrap();
        scopes.set_variable(child, "x", Value::Number(9.0)).unwrap();

        let parent = scopes.collect(child).unwrap();
        assert_eq!(parent, root);

        assert!(matches!(
            scopes.get_variable(child, "x"),
            Err(BasicError::ContextCollected)
        ));
        assert!(matches!(
            scopes.create_sub_context(child),
            Err(BasicError::ContextCollected)
        ));
    }

    #[test]
    fn root_collect_is_noop() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        assert_eq!(scopes.collect(root).unwrap(), root);
        // Root is still usable.
        scopes.set_variable(root, "x", Value::Null).unwrap();
    }

    #[test]
    fn undefined_at_root_errors() {
        let scopes = Scopes::new();
        assert!(matches!(
            scopes.get_variable(scopes.root(), "missing"),
            Err(BasicError::UndefinedObject(_))
        ));
        assert_eq!(
            scopes.try_get_variable(scopes.root(), "missing").unwrap(),
            None
        );
    }

    #[test]
    fn constants_are_write_once() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes.set_constant(root, "pi", Value::Number(3.14)).unwrap();
        assert!(matches!(
            scopes.set_constant(root, "PI", Value::Number(3.0)),
            Err(BasicError::ConstantRedefined(_))
        ));
        assert_eq!(
            scopes.get_variable(root, "PI").unwrap(),
            Value::Number(3.14)
        );

        // Plain assignment cannot touch the constant either.
        assert!(matches!(
            scopes.set_variable(root, "pi", Value::Number(5.0)),
            Err(BasicError::ConstantRedefined(_))
        ));
        assert_eq!(
            scopes.get_variable(root, "pi").unwrap(),
            Value::Number(3.14)
        );

        // Nor can an element write reach through a constant array.
        scopes
            .set_constant(root, "dims", Value::Array(vec![Value::Number(1.0)]))
            .unwrap();
        assert!(matches!(
            scopes.set_array_at(root, "dims", &[0], Value::Number(2.0)),
            Err(BasicError::ConstantRedefined(_))
        ));
    }

    #[test]
    fn array_round_trip_and_bounds() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes
            .set_variable(
                root,
                "grid",
                Value::Array(vec![
                    Value::Array(vec![Value::Number(0.0), Value::Number(0.0)]),
                    Value::Array(vec![Value::Number(0.0), Value::Number(0.0)]),
                ]),
            )
            .unwrap();

        scopes
            .set_array_at(root, "grid", &[1, 0], Value::Number(7.0))
            .unwrap();
        assert_eq!(
            scopes.get_array_at(root, "grid", &[1, 0]).unwrap(),
            Value::Number(7.0)
        );

        // Out of range never grows.
        assert!(matches!(
            scopes.set_array_at(root, "grid", &[2, 0], Value::Null),
            Err(BasicError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            scopes.get_array_at(root, "grid", &[0, 5]),
            Err(BasicError::IndexOutOfRange { .. })
        ));

        // Indexing through a scalar is unavailable, not out-of-range.
        scopes.set_variable(root, "n", Value::Number(3.0)).unwrap();
        assert!(matches!(
            scopes.get_array_at(root, "n", &[0]),
            Err(BasicError::IndexUnavailable(_))
        ));
    }
}
