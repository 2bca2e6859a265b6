//! Compiled instruction graphs and their block-record storage format.
//!
//! Each script becomes a chain of block records keyed by id, linked through
//! `next`/`parent`. Ids are per target and sequential, so encoding the same
//! graph twice yields identical JSON.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::error::{FuseError, FuseResult};
use crate::namespace::{join_path, split_path, NamespaceNode};
use crate::variable::{Literal, VarKind, VarScope};

use super::ast::{Event, Expr, FunctionDecl, HandlerDecl, Item, Stmt};

/// Opcode for calls into modules that have no block of their own.
pub const EXTERN_CALL_OPCODE: &str = "fuse_extern_call";

const ARGUMENT_REPORTER: &str = "argument_reporter_string_number";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstructionGraph {
    pub scripts: Vec<CompiledScript>,
}

impl InstructionGraph {
    /// Every broadcast message sent or listened for.
    pub fn messages(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for script in &self.scripts {
            if let ScriptHead::Handler(Event::Message(message)) = &script.head {
                out.insert(message.clone());
            }
            for op in &script.ops {
                if let Op::Broadcast { message } = op {
                    out.insert(message.clone());
                }
            }
        }
        out
    }

    /// Opcodes of module calls, used to detect required extensions.
    pub fn opcodes(&self) -> BTreeSet<String> {
        self.scripts
            .iter()
            .flat_map(|script| script.ops.iter())
            .filter_map(|op| match op {
                Op::Block { opcode, .. } => Some(opcode.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn op_count(&self) -> usize {
        self.scripts.iter().map(|script| script.ops.len()).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledScript {
    pub head: ScriptHead,
    pub ops: Vec<Op>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptHead {
    Procedure { name: String, params: Vec<String> },
    Handler(Event),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarRef {
    pub name: String,
    pub scope: VarScope,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Literal(Literal),
    Variable(VarRef),
    List(VarRef),
    /// A parameter of the enclosing procedure.
    Argument(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    SetVariable {
        var: VarRef,
        value: Operand,
    },
    ChangeVariable {
        var: VarRef,
        by: Operand,
    },
    AddToList {
        list: VarRef,
        item: Operand,
    },
    CallProcedure {
        name: String,
        args: Vec<Operand>,
    },
    Broadcast {
        message: String,
    },
    /// A call into a namespace module. `inputs` are the input keys in
    /// argument order; `origin` is set when the opcode alone does not
    /// identify the module member.
    Block {
        opcode: String,
        inputs: Vec<String>,
        args: Vec<Operand>,
        origin: Option<(Vec<String>, String)>,
    },
}

/// Opaque ids handed out by the archive assembler.
pub trait SymbolIds {
    /// `(display name, id)` for a variable or list.
    fn variable(&self, var: &VarRef, kind: VarKind) -> Option<(String, String)>;
    fn broadcast(&self, message: &str) -> Option<String>;
}

/// Inverse of [`SymbolIds`] used while decoding.
pub trait SymbolNames {
    /// Source identifier for the variable or list stored under `id`.
    fn variable(&self, id: &str, kind: VarKind) -> Option<String>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedGraph {
    pub items: Vec<Item>,
    pub failures: Vec<DecodeFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeFailure {
    /// Human label of the skipped body, e.g. `function 'reset'`.
    pub unit: String,
    pub reason: String,
}

pub(super) fn encode_graph(graph: &InstructionGraph, ids: &dyn SymbolIds) -> FuseResult<Value> {
    let mut encoder = Encoder {
        ids,
        blocks: Map::new(),
        counter: 0,
    };
    for (index, script) in graph.scripts.iter().enumerate() {
        encoder.script(index, script)?;
    }
    Ok(Value::Object(encoder.blocks))
}

struct Encoder<'a> {
    ids: &'a dyn SymbolIds,
    blocks: Map<String, Value>,
    counter: usize,
}

fn block(opcode: &str, parent: Option<&str>, inputs: Value, fields: Value) -> Value {
    json!({
        "opcode": opcode,
        "next": null,
        "parent": parent,
        "inputs": inputs,
        "fields": fields,
        "shadow": false,
        "topLevel": false,
    })
}

fn proccode(name: &str, arity: usize) -> String {
    let mut code = name.to_string();
    for _ in 0..arity {
        code.push_str(" %s");
    }
    code
}

fn argument_ids(arity: usize) -> Vec<String> {
    (0..arity).map(|index| format!("arg{index}")).collect()
}

impl Encoder<'_> {
    fn fresh(&mut self) -> String {
        self.counter += 1;
        format!("b{}", self.counter)
    }

    fn script(&mut self, index: usize, script: &CompiledScript) -> FuseResult<()> {
        let head_id = self.fresh();
        let mut head = match &script.head {
            ScriptHead::Handler(event) => self.event_head(event)?,
            ScriptHead::Procedure { name, params } => self.procedure_head(&head_id, name, params)?,
        };
        head["topLevel"] = json!(true);
        head["x"] = json!(0);
        head["y"] = json!(index * 160);
        self.blocks.insert(head_id.clone(), head);

        let mut previous = head_id;
        for op in &script.ops {
            let id = self.fresh();
            let record = self.op(&id, &previous, op)?;
            self.blocks.insert(id.clone(), record);
            if let Some(prev) = self.blocks.get_mut(&previous) {
                prev["next"] = json!(id);
            }
            previous = id;
        }
        Ok(())
    }

    fn event_head(&mut self, event: &Event) -> FuseResult<Value> {
        Ok(match event {
            Event::Flag => block("event_whenflagclicked", None, json!({}), json!({})),
            Event::Click => block("event_whenthisspriteclicked", None, json!({}), json!({})),
            Event::Message(message) => {
                let id = self.broadcast_id(message)?;
                block(
                    "event_whenbroadcastreceived",
                    None,
                    json!({}),
                    json!({ "BROADCAST_OPTION": [message, id] }),
                )
            }
            Event::Key(key) => block(
                "event_whenkeypressed",
                None,
                json!({}),
                json!({ "KEY_OPTION": [key, null] }),
            ),
        })
    }

    fn procedure_head(&mut self, head_id: &str, name: &str, params: &[String]) -> FuseResult<Value> {
        let proto_id = self.fresh();
        let arg_ids = argument_ids(params.len());
        let mut proto_inputs = Map::new();
        for (arg_id, param) in arg_ids.iter().zip(params) {
            let reporter_id = self.fresh();
            let mut reporter = block(
                ARGUMENT_REPORTER,
                Some(&proto_id),
                json!({}),
                json!({ "VALUE": [param, null] }),
            );
            reporter["shadow"] = json!(true);
            self.blocks.insert(reporter_id.clone(), reporter);
            proto_inputs.insert(arg_id.clone(), json!([1, reporter_id]));
        }
        let mut proto = block(
            "procedures_prototype",
            Some(head_id),
            Value::Object(proto_inputs),
            json!({}),
        );
        proto["shadow"] = json!(true);
        proto["mutation"] = json!({
            "tagName": "mutation",
            "children": [],
            "proccode": proccode(name, params.len()),
            "argumentids": serde_json::to_string(&arg_ids)?,
            "argumentnames": serde_json::to_string(params)?,
            "argumentdefaults": serde_json::to_string(&vec![""; params.len()])?,
            "warp": "false",
        });
        self.blocks.insert(proto_id.clone(), proto);

        Ok(block(
            "procedures_definition",
            None,
            json!({ "custom_block": [1, proto_id] }),
            json!({}),
        ))
    }

    fn op(&mut self, id: &str, parent: &str, op: &Op) -> FuseResult<Value> {
        Ok(match op {
            Op::SetVariable { var, value } => {
                let field = self.variable_field(var, VarKind::Scalar)?;
                let value = self.operand(id, value)?;
                block(
                    "data_setvariableto",
                    Some(parent),
                    json!({ "VALUE": value }),
                    json!({ "VARIABLE": field }),
                )
            }
            Op::ChangeVariable { var, by } => {
                let field = self.variable_field(var, VarKind::Scalar)?;
                let value = self.operand(id, by)?;
                block(
                    "data_changevariableby",
                    Some(parent),
                    json!({ "VALUE": value }),
                    json!({ "VARIABLE": field }),
                )
            }
            Op::AddToList { list, item } => {
                let field = self.variable_field(list, VarKind::List)?;
                let item = self.operand(id, item)?;
                block(
                    "data_addtolist",
                    Some(parent),
                    json!({ "ITEM": item }),
                    json!({ "LIST": field }),
                )
            }
            Op::CallProcedure { name, args } => {
                let arg_ids = argument_ids(args.len());
                let mut inputs = Map::new();
                for (arg_id, arg) in arg_ids.iter().zip(args) {
                    inputs.insert(arg_id.clone(), self.operand(id, arg)?);
                }
                let mut call = block("procedures_call", Some(parent), Value::Object(inputs), json!({}));
                call["mutation"] = json!({
                    "tagName": "mutation",
                    "children": [],
                    "proccode": proccode(name, args.len()),
                    "argumentids": serde_json::to_string(&arg_ids)?,
                    "warp": "false",
                });
                call
            }
            Op::Broadcast { message } => {
                let broadcast_id = self.broadcast_id(message)?;
                block(
                    "event_broadcast",
                    Some(parent),
                    json!({ "BROADCAST_INPUT": [1, [11, message, broadcast_id]] }),
                    json!({}),
                )
            }
            Op::Block {
                opcode,
                inputs: keys,
                args,
                origin,
            } => {
                let mut inputs = Map::new();
                for (key, arg) in keys.iter().zip(args) {
                    inputs.insert(key.clone(), self.operand(id, arg)?);
                }
                let mut record = block(opcode, Some(parent), Value::Object(inputs), json!({}));
                if let Some((module, member)) = origin {
                    record["mutation"] = json!({
                        "tagName": "mutation",
                        "children": [],
                        "fuse_module": join_path(module),
                        "fuse_member": member,
                        "fuse_inputs": serde_json::to_string(keys)?,
                    });
                }
                record
            }
        })
    }

    fn operand(&mut self, owner: &str, operand: &Operand) -> FuseResult<Value> {
        Ok(match operand {
            Operand::Literal(Literal::Number(num)) => json!([1, [4, num]]),
            Operand::Literal(Literal::Text(text)) => json!([1, [10, text]]),
            Operand::Variable(var) => {
                let [display, id] = self.variable_field(var, VarKind::Scalar)?;
                json!([3, [12, display, id], [10, ""]])
            }
            Operand::List(var) => {
                let [display, id] = self.variable_field(var, VarKind::List)?;
                json!([3, [13, display, id], [10, ""]])
            }
            Operand::Argument(param) => {
                let reporter_id = self.fresh();
                let reporter = block(
                    ARGUMENT_REPORTER,
                    Some(owner),
                    json!({}),
                    json!({ "VALUE": [param, null] }),
                );
                self.blocks.insert(reporter_id.clone(), reporter);
                json!([3, reporter_id, [10, ""]])
            }
        })
    }

    fn variable_field(&self, var: &VarRef, kind: VarKind) -> FuseResult<[String; 2]> {
        let (display, id) = self.ids.variable(var, kind).ok_or_else(|| {
            FuseError::Serialization(format!("no id assigned to {kind} '{}'", var.name))
        })?;
        Ok([display, id])
    }

    fn broadcast_id(&self, message: &str) -> FuseResult<String> {
        self.ids.broadcast(message).ok_or_else(|| {
            FuseError::Serialization(format!("no id assigned to broadcast '{message}'"))
        })
    }
}

type Decode<T> = Result<T, String>;

pub(super) fn decode_graph(
    blocks: &Value,
    names: &dyn SymbolNames,
    known: &NamespaceNode,
) -> DecodedGraph {
    let mut decoded = DecodedGraph::default();
    let Some(map) = blocks.as_object() else {
        if !blocks.is_null() {
            decoded.failures.push(DecodeFailure {
                unit: "blocks".to_string(),
                reason: "block table is not an object".to_string(),
            });
        }
        return decoded;
    };
    let decoder = Decoder { map, names, known };

    for (id, record) in map {
        if !record.get("topLevel").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        let opcode = record.get("opcode").and_then(Value::as_str).unwrap_or("");
        match opcode {
            "procedures_definition" => {
                let unit_label = match decoder.prototype(record) {
                    Ok((name, _)) => format!("function '{name}'"),
                    Err(_) => format!("function at block '{id}'"),
                };
                match decoder.function(record) {
                    Ok(function) => decoded.items.push(Item::Function(function)),
                    Err(reason) => decoded.failures.push(DecodeFailure {
                        unit: unit_label,
                        reason,
                    }),
                }
            }
            _ => match decoder.handler(record) {
                Ok(handler) => decoded.items.push(Item::Handler(handler)),
                Err(reason) => decoded.failures.push(DecodeFailure {
                    unit: format!("script '{opcode}' at block '{id}'"),
                    reason,
                }),
            },
        }
    }
    decoded
}

struct Decoder<'a> {
    map: &'a Map<String, Value>,
    names: &'a dyn SymbolNames,
    known: &'a NamespaceNode,
}

fn str_field<'v>(record: &'v Value, key: &str) -> Option<&'v str> {
    record.get("fields")?.get(key)?.get(0)?.as_str()
}

fn mutation_list(record: &Value, key: &str) -> Decode<Vec<String>> {
    let raw = record
        .get("mutation")
        .and_then(|m| m.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| format!("mutation is missing '{key}'"))?;
    serde_json::from_str(raw).map_err(|err| format!("mutation '{key}' is malformed: {err}"))
}

fn proc_name(record: &Value) -> Decode<String> {
    let code = record
        .get("mutation")
        .and_then(|m| m.get("proccode"))
        .and_then(Value::as_str)
        .ok_or("mutation is missing 'proccode'")?;
    code.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| "empty proccode".to_string())
}

impl<'a> Decoder<'a> {
    fn get(&self, id: &str) -> Decode<&'a Value> {
        self.map
            .get(id)
            .ok_or_else(|| format!("dangling block reference '{id}'"))
    }

    fn prototype(&self, definition: &Value) -> Decode<(String, Vec<String>)> {
        let proto_id = definition
            .pointer("/inputs/custom_block/1")
            .and_then(Value::as_str)
            .ok_or("definition has no prototype")?;
        let proto = self.get(proto_id)?;
        Ok((proc_name(proto)?, mutation_list(proto, "argumentnames")?))
    }

    fn function(&self, definition: &Value) -> Decode<FunctionDecl> {
        let (name, params) = self.prototype(definition)?;
        let body = self.body(definition, &params)?;
        Ok(FunctionDecl { name, params, body })
    }

    fn handler(&self, head: &Value) -> Decode<HandlerDecl> {
        let opcode = head.get("opcode").and_then(Value::as_str).unwrap_or("");
        let event = match opcode {
            "event_whenflagclicked" => Event::Flag,
            "event_whenthisspriteclicked" | "event_whenstageclicked" => Event::Click,
            "event_whenbroadcastreceived" => Event::Message(
                str_field(head, "BROADCAST_OPTION")
                    .ok_or("broadcast hat without a message")?
                    .to_string(),
            ),
            "event_whenkeypressed" => Event::Key(
                str_field(head, "KEY_OPTION")
                    .ok_or("key hat without a key")?
                    .to_string(),
            ),
            other => return Err(format!("unsupported top-level block '{other}'")),
        };
        let body = self.body(head, &[])?;
        Ok(HandlerDecl { event, body })
    }

    fn body(&self, head: &Value, params: &[String]) -> Decode<Vec<Stmt>> {
        let mut stmts = Vec::new();
        let mut next = head.get("next").and_then(Value::as_str);
        while let Some(id) = next {
            if stmts.len() > self.map.len() {
                return Err("block chain loops".to_string());
            }
            let record = self.get(id)?;
            stmts.push(self.statement(record, params)?);
            next = record.get("next").and_then(Value::as_str);
        }
        Ok(stmts)
    }

    fn statement(&self, record: &Value, params: &[String]) -> Decode<Stmt> {
        let opcode = record.get("opcode").and_then(Value::as_str).unwrap_or("");
        match opcode {
            "data_setvariableto" => Ok(Stmt::Set {
                var: self.field_variable(record, "VARIABLE", VarKind::Scalar)?,
                value: self.input(record, "VALUE", params)?,
            }),
            "data_changevariableby" => Ok(Stmt::Change {
                var: self.field_variable(record, "VARIABLE", VarKind::Scalar)?,
                by: self.input(record, "VALUE", params)?,
            }),
            "data_addtolist" => Ok(Stmt::Add {
                item: self.input(record, "ITEM", params)?,
                list: self.field_variable(record, "LIST", VarKind::List)?,
            }),
            "procedures_call" => {
                let name = proc_name(record)?;
                let args = mutation_list(record, "argumentids")?
                    .iter()
                    .map(|key| self.input(record, key, params))
                    .collect::<Decode<Vec<_>>>()?;
                Ok(Stmt::Call { name, args })
            }
            "event_broadcast" => {
                let message = record
                    .pointer("/inputs/BROADCAST_INPUT/1/1")
                    .and_then(Value::as_str)
                    .ok_or("broadcast without a message")?;
                Ok(Stmt::Broadcast(message.to_string()))
            }
            _ => self.module_call(opcode, record, params),
        }
    }

    fn module_call(&self, opcode: &str, record: &Value, params: &[String]) -> Decode<Stmt> {
        let mutation = record.get("mutation");
        let (path, member, keys) =
            match mutation.and_then(|m| m.get("fuse_module")).and_then(Value::as_str) {
                Some(module) => {
                    let member = mutation
                        .and_then(|m| m.get("fuse_member"))
                        .and_then(Value::as_str)
                        .ok_or("module call without a member")?;
                    (
                        split_path(module),
                        member.to_string(),
                        mutation_list(record, "fuse_inputs")?,
                    )
                }
                None => {
                    let (path, member, sig) = self
                        .known
                        .find_opcode(opcode)
                        .ok_or_else(|| format!("unknown opcode '{opcode}'"))?;
                    let keys = sig.params.iter().map(|p| p.to_ascii_uppercase()).collect();
                    (path, member, keys)
                }
            };
        let args = keys
            .iter()
            .map(|key| self.input(record, key, params))
            .collect::<Decode<Vec<_>>>()?;
        Ok(Stmt::ModuleCall { path, member, args })
    }

    fn field_variable(&self, record: &Value, field: &str, kind: VarKind) -> Decode<String> {
        let id = record
            .get("fields")
            .and_then(|f| f.get(field))
            .and_then(|f| f.get(1))
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing field '{field}'"))?;
        self.names
            .variable(id, kind)
            .ok_or_else(|| format!("unknown {kind} id '{id}'"))
    }

    fn input(&self, record: &Value, key: &str, params: &[String]) -> Decode<Expr> {
        let input = record
            .get("inputs")
            .and_then(|i| i.get(key))
            .ok_or_else(|| format!("missing input '{key}'"))?;
        let value = input.get(1).ok_or_else(|| format!("empty input '{key}'"))?;

        if let Some(reporter_id) = value.as_str() {
            let reporter = self.get(reporter_id)?;
            let opcode = reporter.get("opcode").and_then(Value::as_str).unwrap_or("");
            if opcode != ARGUMENT_REPORTER {
                return Err(format!("unsupported reporter '{opcode}'"));
            }
            let param = str_field(reporter, "VALUE").ok_or("argument reporter without a name")?;
            if !params.iter().any(|p| p == param) {
                return Err(format!("argument '{param}' used outside its function"));
            }
            return Ok(Expr::Var(param.to_string()));
        }

        let tag = value.get(0).and_then(Value::as_u64).unwrap_or(0);
        let payload = value.get(1);
        match tag {
            4..=8 => {
                let text = match payload {
                    Some(Value::String(text)) => text.clone(),
                    Some(Value::Number(num)) => num.to_string(),
                    _ => return Err(format!("malformed number in input '{key}'")),
                };
                Ok(Expr::Literal(Literal::Number(text)))
            }
            10 => Ok(Expr::Literal(Literal::from_json(
                payload.unwrap_or(&Value::Null),
            ))),
            12 | 13 => {
                let kind = if tag == 12 {
                    VarKind::Scalar
                } else {
                    VarKind::List
                };
                let id = value
                    .get(2)
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("malformed variable in input '{key}'"))?;
                self.names
                    .variable(id, kind)
                    .map(Expr::Var)
                    .ok_or_else(|| format!("unknown {kind} id '{id}'"))
            }
            other => Err(format!("unsupported input type {other} in '{key}'")),
        }
    }
}
