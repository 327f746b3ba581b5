//! The evaluator: a trampolined tree walk with an explicit continuation
//! stack.
//!
//! Rather than recursing on the host stack, [`Interpreter::evaluate`] keeps
//! a stack of [`Frame`]s describing what to do with the next produced value.
//! Only call frames (function application, thunk forcing, field evaluation)
//! count against the configured stack limit; bookkeeping frames do not.
//! Tail-strict calls reuse the caller's call frame after forcing every
//! argument, which is what makes idiomatic deep recursion work.
//!
//! The evaluator owns the heap, the scratch register holding the last
//! computed value, and a stash for values that must survive a collection
//! while not reachable from either. Every allocation may trigger a
//! collection, so any code path holding an intermediate heap value across an
//! allocation keeps it reachable through a frame, the scratch register, or
//! the stash.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    ast::{BinaryOp, ExprKind, ExprRef, Hide, UnaryOp},
    builtins::Builtin,
    config::EvalConfig,
    error::{LocationRange, RunResult, RuntimeError, TraceFrame},
    heap::{Heap, HeapId},
    import::{ImportCache, ImportResolver, ResolvedImport},
    intern::{Identifier, Interner},
    run::ExtVar,
    stdlib::StdLib,
    tracer::EvalTracer,
    value::{
        Bindings, ClosureCell, ClosureKind, HeapData, ObjectCell, SimpleField, ThunkCell,
        ThunkState, Value,
    },
};

/// Forced builtin arguments; almost every builtin takes at most four.
pub(crate) type ArgValues = SmallVec<[Value; 4]>;

/// What to do with the produced value, per continuation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    ApplyTarget,
    Assert,
    AssertMsg,
    BinaryLeft,
    BinaryRight,
    BuiltinFilter,
    BuiltinForceThunks,
    Call,
    EqualityManifest,
    Error,
    If,
    IndexTarget,
    IndexIndex,
    Local,
    Object,
    ObjectCompArray,
    ObjectCompElement,
    StringConcat,
    Unary,
}

/// One continuation frame. The set of members actually used depends on the
/// kind; this is a tagged union in spirit, flattened for reuse.
#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    /// The expression this frame continues, when there is one.
    pub ast: Option<ExprRef>,
    pub loc: LocationRange,
    /// Set on call frames eligible for tail-call frame reuse.
    pub tail_call: bool,
    /// Scratch values, meaning depends on the kind.
    pub val: Value,
    pub val2: Value,
    /// Iteration cursor (field index, argument index, element index).
    pub cursor: usize,
    /// Accumulated object fields (Object frames).
    pub fields: AHashMap<Identifier, SimpleField>,
    /// Accumulated comprehension elements (ObjectCompElement frames).
    pub elements: AHashMap<Identifier, HeapId>,
    /// Argument / element thunks kept reachable by this frame.
    pub thunks: Vec<HeapId>,
    /// The thunk, closure, or object leaf being executed; used for traces.
    pub context: Option<HeapId>,
    /// Lexically enclosing object and super level.
    pub self_obj: Option<HeapId>,
    pub offset: u32,
    /// Variables introduced at this frame.
    pub bindings: Bindings,
}

impl Frame {
    fn new(kind: FrameKind, ast: &ExprRef) -> Self {
        Self {
            kind,
            loc: ast.loc.clone(),
            ast: Some(Rc::clone(ast)),
            tail_call: false,
            val: Value::Null,
            val2: Value::Null,
            cursor: 0,
            fields: AHashMap::new(),
            elements: AHashMap::new(),
            thunks: Vec::new(),
            context: None,
            self_obj: None,
            offset: 0,
            bindings: Bindings::new(),
        }
    }

    fn with_loc(kind: FrameKind, loc: LocationRange) -> Self {
        Self {
            kind,
            ast: None,
            loc,
            tail_call: false,
            val: Value::Null,
            val2: Value::Null,
            cursor: 0,
            fields: AHashMap::new(),
            elements: AHashMap::new(),
            thunks: Vec::new(),
            context: None,
            self_obj: None,
            offset: 0,
            bindings: Bindings::new(),
        }
    }

    fn is_call(&self) -> bool {
        self.kind == FrameKind::Call
    }

    /// Marks everything visible from this frame.
    fn mark(&self, heap: &mut Heap) {
        heap.mark_value(self.val);
        heap.mark_value(self.val2);
        if let Some(id) = self.context {
            heap.mark(id);
        }
        if let Some(id) = self.self_obj {
            heap.mark(id);
        }
        for &id in self.bindings.values() {
            heap.mark(id);
        }
        for &id in self.elements.values() {
            heap.mark(id);
        }
        for &id in &self.thunks {
            heap.mark(id);
        }
    }
}

/// The continuation stack, with the call-frame limit.
#[derive(Debug)]
pub(crate) struct Stack {
    frames: Vec<Frame>,
    calls: usize,
    limit: usize,
    high_water: usize,
}

impl Stack {
    fn new(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            calls: 0,
            limit,
            high_water: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn top(&self) -> &Frame {
        self.frames
            .last()
            .unwrap_or_else(|| unreachable!("empty continuation stack"))
    }

    pub fn top_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .unwrap_or_else(|| unreachable!("empty continuation stack"))
    }

    fn push(&mut self, frame: Frame) {
        if frame.is_call() {
            self.calls += 1;
            self.high_water = self.high_water.max(self.calls);
        }
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        if self.top().is_call() {
            self.calls -= 1;
        }
        self.frames.pop();
    }

    /// The closest binding for `id`, searching down to and including the
    /// nearest call frame.
    fn lookup_var(&self, id: Identifier) -> Option<HeapId> {
        for frame in self.frames.iter().rev() {
            if let Some(&th) = frame.bindings.get(&id) {
                return Some(th);
            }
            if frame.is_call() {
                break;
            }
        }
        None
    }

    /// The enclosing `self` and super level, from the nearest call frame.
    fn get_self_binding(&self) -> (Option<HeapId>, u32) {
        for frame in self.frames.iter().rev() {
            if frame.is_call() {
                return (frame.self_obj, frame.offset);
            }
        }
        (None, 0)
    }

    fn mark(&self, heap: &mut Heap) {
        for frame in &self.frames {
            frame.mark(heap);
        }
    }

    /// When a tail-call-eligible frame sits under only local frames, pop
    /// them all so the next call can reuse its slot.
    fn tail_call_trim(&mut self) {
        for i in (0..self.frames.len()).rev() {
            match self.frames[i].kind {
                FrameKind::Call => {
                    if !self.frames[i].tail_call || !self.frames[i].thunks.is_empty() {
                        return;
                    }
                    self.frames.truncate(i);
                    self.calls -= 1;
                    return;
                }
                FrameKind::Local => {}
                _ => return,
            }
        }
    }
}

/// How the host supplied an external variable, after preparation.
#[derive(Debug)]
enum ExtEntry {
    Str(Rc<str>),
    /// Pre-parsed code fragment held as an unforced thunk.
    Code(HeapId),
}

/// Control flow out of one small step of the machine.
pub(crate) enum Cont {
    /// Evaluate this expression next.
    Recurse(ExprRef),
    /// The top frame is finished; pop it.
    Pop,
    /// The top frame changed in place (or was replaced); process it again.
    Replace,
}

/// Holds the intermediate state during execution and implements the
/// semantics of the language. One instance per run.
pub(crate) struct Interpreter<'a, R: ImportResolver, T: EvalTracer> {
    pub heap: Heap,
    pub scratch: Value,
    stack: Stack,
    /// Intermediate values kept live across allocations when no frame or
    /// register holds them.
    pub stash: Vec<HeapId>,
    pub interner: Interner,
    ext_vars: AHashMap<String, ExtEntry>,
    import_cache: ImportCache,
    stdlib: &'a StdLib,
    resolver: &'a mut R,
    pub tracer: &'a mut T,
    /// Names thunks created for array elements, in error traces.
    id_array_element: Identifier,
    id_extvar: Identifier,
}

impl<'a, R: ImportResolver, T: EvalTracer> Interpreter<'a, R, T> {
    pub fn new(
        config: &EvalConfig,
        mut interner: Interner,
        stdlib: &'a StdLib,
        ext_vars: &IndexMap<String, ExtVar>,
        resolver: &'a mut R,
        tracer: &'a mut T,
    ) -> Result<Self, crate::error::StaticError> {
        let id_array_element = interner.intern("array_element");
        let id_extvar = interner.intern("extvar");
        let mut vm = Self {
            heap: Heap::new(config.gc_min_objects as usize, config.gc_growth_trigger),
            scratch: Value::Null,
            stack: Stack::new(config.max_stack as usize),
            stash: Vec::new(),
            interner,
            ext_vars: AHashMap::new(),
            import_cache: ImportCache::new(),
            stdlib,
            resolver,
            tracer,
            id_array_element,
            id_extvar,
        };
        for (name, var) in ext_vars {
            let entry = match var {
                ExtVar::Str(s) => ExtEntry::Str(Rc::from(s.as_str())),
                ExtVar::Code(code) => {
                    let program = vm.stdlib.load_program(
                        code,
                        &format!("<extvar:{name}>"),
                        &mut vm.interner,
                    )?;
                    let thunk = vm.heap.alloc(HeapData::Thunk(ThunkCell::pending(
                        vm.id_extvar,
                        None,
                        0,
                        program,
                    )));
                    // Stashed for the whole run so the collector never
                    // reclaims an unforced external variable.
                    vm.stash.push(thunk);
                    ExtEntry::Code(thunk)
                }
            };
            vm.ext_vars.insert(name.clone(), entry);
        }
        Ok(vm)
    }

    /// Allocates a heap cell and maybe runs a collection cycle. The freshly
    /// allocated cell is always treated as a root.
    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = self.heap.alloc(data);
        if self.heap.needs_gc() {
            self.heap.start_mark();
            self.heap.mark(id);
            self.stack.mark(&mut self.heap);
            self.heap.mark_value(self.scratch);
            for i in 0..self.stash.len() {
                let stashed = self.stash[i];
                self.heap.mark(stashed);
            }
            let (before, after) = self.heap.sweep();
            self.tracer.gc_cycle(before, after);
        }
        id
    }

    pub fn make_string(&mut self, s: &str) -> Value {
        Value::Str(self.alloc(HeapData::Str(Rc::from(s))))
    }

    fn number_check(&self, loc: &LocationRange, v: f64) -> RunResult<Value> {
        if v.is_nan() {
            return Err(self.error(loc, "Not a number"));
        }
        if v.is_infinite() {
            return Err(self.error(loc, "Overflow"));
        }
        Ok(Value::Number(v))
    }

    /// Integer coercion for bitwise operators: finite and within the range
    /// where doubles represent integers exactly.
    fn to_safe_integer(&self, loc: &LocationRange, v: f64) -> RunResult<i64> {
        if !v.is_finite() || v.abs() > 9_007_199_254_740_992.0 {
            return Err(self.error(
                loc,
                format!("Numeric value is not an integer in safe range: {v}"),
            ));
        }
        Ok(v.trunc() as i64)
    }

    /// Builds a runtime error with a stack trace from the continuation
    /// stack, most recent frame first.
    pub fn error(&self, loc: &LocationRange, msg: impl Into<String>) -> RuntimeError {
        let mut trace = vec![TraceFrame::new(loc.clone())];
        for i in (0..self.stack.frames().len()).rev() {
            let frame = &self.stack.frames()[i];
            if frame.is_call() {
                if let Some(context) = frame.context {
                    if let Some(last) = trace.last_mut() {
                        last.name = self.entity_name(i, context);
                    }
                }
                trace.push(TraceFrame::new(frame.loc.clone()));
            }
        }
        RuntimeError {
            msg: msg.into(),
            trace,
        }
    }

    /// Best-effort name for a heap entity: the closest in-scope variable
    /// that points at it, otherwise "anonymous".
    fn entity_name(&self, from: usize, entity: HeapId) -> String {
        let mut name = String::new();
        for frame in self.stack.frames()[..from].iter().rev() {
            for (&id, &th) in &frame.bindings {
                let Some(content) = self.heap.thunk_if(th).and_then(ThunkCell::content) else {
                    continue;
                };
                if content.heap_id() == Some(entity) {
                    name = self.interner.name(id).to_string();
                }
            }
            if frame.is_call() {
                break;
            }
        }
        if name.is_empty() {
            name = "anonymous".to_string();
        }
        match self.heap.get(entity) {
            HeapData::Object(_) => format!("object <{name}>"),
            HeapData::Thunk(thunk) => {
                format!("thunk <{}>", self.interner.name(thunk.name))
            }
            HeapData::Closure(closure) => match &closure.kind {
                ClosureKind::Builtin(builtin) => {
                    format!("builtin function <{}>", builtin.name())
                }
                ClosureKind::User { .. } => format!("function <{name}>"),
            },
            _ => name,
        }
    }

    /// Pushes a call frame, enforcing the stack limit. Trims tail-call
    /// frames first so deep tail-strict recursion stays flat.
    pub fn new_call(
        &mut self,
        loc: &LocationRange,
        context: Option<HeapId>,
        self_obj: Option<HeapId>,
        offset: u32,
        bindings: Bindings,
    ) -> RunResult<()> {
        self.stack.tail_call_trim();
        if self.stack.calls >= self.stack.limit {
            return Err(self.error(loc, "Max stack frames exceeded."));
        }
        let mut frame = Frame::with_loc(FrameKind::Call, loc.clone());
        frame.context = context;
        frame.self_obj = self_obj;
        frame.offset = offset;
        frame.bindings = bindings;
        let prev_high = self.stack.high_water;
        self.stack.push(frame);
        if self.stack.high_water > prev_high {
            self.tracer.call_depth(self.stack.high_water);
        }
        Ok(())
    }

    pub fn top_frame(&self) -> &Frame {
        self.stack.top()
    }

    pub fn top_frame_mut(&mut self) -> &mut Frame {
        self.stack.top_mut()
    }

    pub fn pop_frame(&mut self) {
        self.stack.pop();
    }

    pub fn push_protect_frame(&mut self, loc: &LocationRange) {
        self.stack
            .push(Frame::with_loc(FrameKind::EqualityManifest, loc.clone()));
    }

    /// Captures the thunks for the given free variables from the stack.
    fn capture(&self, free_vars: &[Identifier]) -> Bindings {
        let mut env = Bindings::with_capacity(free_vars.len());
        for &fv in free_vars {
            if let Some(th) = self.stack.lookup_var(fv) {
                env.insert(fv, th);
            }
        }
        env
    }

    /// Number of leaves of an object's inheritance tree.
    fn count_leaves(&self, obj: HeapId) -> u32 {
        match self.heap.object(obj) {
            ObjectCell::Extended { left, right } => {
                self.count_leaves(*left) + self.count_leaves(*right)
            }
            ObjectCell::Super { root, .. } => self.count_leaves(*root),
            ObjectCell::Simple { .. } | ObjectCell::Comprehension { .. } => 1,
        }
    }

    /// Depth-first right-to-left search of the leaf tree for a field,
    /// skipping the first `start_from` leaves. Returns the leaf, its depth,
    /// and the object `self` should be bound to.
    fn find_object(
        &self,
        f: Identifier,
        root: HeapId,
        curr: HeapId,
        start_from: u32,
        counter: &mut u32,
    ) -> Option<(HeapId, u32, HeapId)> {
        match self.heap.object(curr) {
            ObjectCell::Extended { left, right } => {
                let (left, right) = (*left, *right);
                if let Some(found) = self.find_object(f, root, right, start_from, counter) {
                    return Some(found);
                }
                self.find_object(f, root, left, start_from, counter)
            }
            ObjectCell::Super { root: sroot, offset } => {
                let (sroot, offset) = (*sroot, *offset);
                let mut counter2 = 0;
                self.find_object(f, sroot, sroot, offset, &mut counter2)
            }
            ObjectCell::Simple { fields, .. } => {
                if *counter >= start_from && fields.contains_key(&f) {
                    return Some((curr, *counter, root));
                }
                *counter += 1;
                None
            }
            ObjectCell::Comprehension { elements, .. } => {
                if *counter >= start_from && elements.contains_key(&f) {
                    return Some((curr, *counter, root));
                }
                *counter += 1;
                None
            }
        }
    }

    /// Field map with effective visibility. On an extension the right side
    /// wins; a right-side `Inherit` defers to the left (base) declaration,
    /// so overriding a hidden field with `:` keeps it hidden.
    fn object_fields_with_hide(
        &self,
        obj: HeapId,
        counter: &mut u32,
        skip: u32,
    ) -> AHashMap<Identifier, Hide> {
        let mut result = AHashMap::new();
        match self.heap.object(obj) {
            ObjectCell::Simple { fields, .. } => {
                *counter += 1;
                if *counter <= skip {
                    return result;
                }
                for (&id, field) in fields {
                    result.insert(id, field.hide);
                }
            }
            ObjectCell::Extended { left, right } => {
                let (left, right) = (*left, *right);
                result = self.object_fields_with_hide(right, counter, skip);
                for (id, hide) in self.object_fields_with_hide(left, counter, skip) {
                    match result.get(&id) {
                        None => {
                            result.insert(id, hide);
                        }
                        Some(Hide::Inherit) => {
                            result.insert(id, hide);
                        }
                        Some(_) => {}
                    }
                }
            }
            ObjectCell::Super { root, offset } => {
                let (root, offset) = (*root, *offset);
                let mut counter2 = 0;
                return self.object_fields_with_hide(root, &mut counter2, offset);
            }
            ObjectCell::Comprehension { elements, .. } => {
                *counter += 1;
                if *counter <= skip {
                    return result;
                }
                for &id in elements.keys() {
                    result.insert(id, Hide::Visible);
                }
            }
        }
        result
    }

    /// Non-hidden field identifiers of an object.
    pub fn visible_fields(&self, obj: HeapId) -> Vec<Identifier> {
        let mut counter = 0;
        self.object_fields_with_hide(obj, &mut counter, 0)
            .into_iter()
            .filter(|(_, hide)| *hide != Hide::Hidden)
            .map(|(id, _)| id)
            .collect()
    }

    /// Non-hidden field names, alphabetically sorted.
    pub fn visible_field_names(&self, obj: HeapId) -> Vec<String> {
        let mut names: Vec<String> = self
            .visible_fields(obj)
            .into_iter()
            .map(|id| self.interner.name(id).to_string())
            .collect();
        names.sort_unstable();
        names
    }

    /// Resolves a field on an object. Pushes the call frame that binds
    /// `self`, the super level, and the leaf's environment, and returns the
    /// field body to evaluate in it.
    pub fn object_index(
        &mut self,
        loc: &LocationRange,
        obj: HeapId,
        f: Identifier,
    ) -> RunResult<ExprRef> {
        let mut counter = 0;
        let Some((leaf, found_at, self_root)) = self.find_object(f, obj, obj, 0, &mut counter)
        else {
            return Err(self.error(
                loc,
                format!("Field does not exist: {}", self.interner.name(f)),
            ));
        };
        let (body, bindings) = match self.heap.object(leaf) {
            ObjectCell::Simple { env, fields, .. } => {
                (fields[&f].body.clone(), env.clone())
            }
            ObjectCell::Comprehension {
                env,
                value,
                id,
                elements,
            } => {
                let mut bindings = env.clone();
                bindings.insert(*id, elements[&f]);
                (value.clone(), bindings)
            }
            _ => unreachable!("field lookup returned a non-leaf object"),
        };
        self.new_call(loc, Some(leaf), Some(self_root), found_at, bindings)?;
        Ok(body)
    }

    /// Forces a thunk outside the trampoline (array equality, manifesting).
    /// The caller's scratch value is kept reachable through the call frame.
    pub fn force_thunk(&mut self, loc: &LocationRange, th: HeapId) -> RunResult<Value> {
        let (env, self_obj, offset, body) = match &self.heap.thunk(th).state {
            ThunkState::Filled(v) => return Ok(*v),
            ThunkState::Pending {
                env,
                self_obj,
                offset,
                body,
            } => (env.clone(), *self_obj, *offset, Rc::clone(body)),
        };
        self.new_call(loc, Some(th), self_obj, offset, env)?;
        let saved = self.scratch;
        self.stack.top_mut().val = saved;
        self.evaluate(body)?;
        let result = self.scratch;
        self.heap.thunk_mut(th).fill(result);
        self.scratch = self.stack.top().val;
        self.stack.pop();
        Ok(result)
    }

    /// Structural equality. Forces array elements and object fields, so it
    /// can trigger collection cycles; both operands are kept reachable by
    /// the caller's frame.
    pub fn equality(&mut self, loc: &LocationRange, a: Value, b: Value) -> RunResult<bool> {
        match (a, b) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
            (Value::Number(x), Value::Number(y)) => Ok(x == y),
            (Value::Function(_), Value::Function(_)) => Ok(false),
            (Value::Str(x), Value::Str(y)) => {
                Ok(self.heap.str_value(x) == self.heap.str_value(y))
            }
            (Value::Array(x), Value::Array(y)) => {
                if self.heap.array(x).len() != self.heap.array(y).len() {
                    return Ok(false);
                }
                let len = self.heap.array(x).len();
                for i in 0..len {
                    let th_a = self.heap.array(x)[i];
                    let th_b = self.heap.array(y)[i];
                    let va = self.force_thunk(loc, th_a)?;
                    let vb = self.force_thunk(loc, th_b)?;
                    if !self.equality(loc, va, vb)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Object(x), Value::Object(y)) => {
                let mut fields_a = self.visible_fields(x);
                let mut fields_b = self.visible_fields(y);
                fields_a.sort_unstable();
                fields_b.sort_unstable();
                if fields_a != fields_b {
                    return Ok(false);
                }
                // Keep both intermediate values reachable while fields force.
                self.push_protect_frame(loc);
                let mut different = false;
                for f in fields_a {
                    let body_a = self.object_index(loc, x, f)?;
                    self.evaluate(body_a)?;
                    self.stack.pop();
                    let va = self.scratch;
                    self.stack.top_mut().val = va;

                    let body_b = self.object_index(loc, y, f)?;
                    self.evaluate(body_b)?;
                    self.stack.pop();
                    let vb = self.scratch;
                    self.stack.top_mut().val2 = vb;

                    if !self.equality(loc, va, vb)? {
                        different = true;
                        break;
                    }
                }
                self.stack.pop();
                Ok(!different)
            }
            _ => Ok(false),
        }
    }

    fn import_contents(
        &mut self,
        loc: &LocationRange,
        path: &str,
    ) -> RunResult<ResolvedImport> {
        let base_dir = loc.dir_name();
        if let Some(cached) = self.import_cache.lookup(&base_dir, path) {
            let cached = cached.clone();
            self.tracer.import_resolved(&cached.resolved_path, true);
            return Ok(cached);
        }
        match self.resolver.resolve(&base_dir, path) {
            Ok((contents, resolved_path)) => {
                let resolved = ResolvedImport {
                    contents: Rc::from(contents.as_str()),
                    resolved_path: Rc::from(resolved_path.as_str()),
                };
                self.tracer.import_resolved(&resolved.resolved_path, false);
                self.import_cache
                    .insert(base_dir, path.to_string(), resolved.clone());
                Ok(resolved)
            }
            Err(msg) => Err(self.error(loc, format!("Couldn't open import \"{path}\": {msg}"))),
        }
    }

    /// Imports a file as a parsed, analysed, std-wrapped program. Parsed
    /// programs are cached under the resolved path.
    fn import_program(&mut self, loc: &LocationRange, path: &str) -> RunResult<ExprRef> {
        let resolved = self.import_contents(loc, path)?;
        if let Some(program) = self.import_cache.lookup_program(&resolved.resolved_path) {
            return Ok(program);
        }
        let program = self
            .stdlib
            .load_program(&resolved.contents, &resolved.resolved_path, &mut self.interner)
            .map_err(|err| self.error(loc, format!("{}: {}", err.loc, err.msg)))?;
        self.import_cache
            .insert_program(Rc::clone(&resolved.resolved_path), Rc::clone(&program));
        Ok(program)
    }

    /// Evaluates an expression to completion; the result lands in the
    /// scratch register. Re-entrant: the manifester and equality use it on
    /// sub-expressions with frames already on the stack.
    pub fn evaluate(&mut self, ast: ExprRef) -> RunResult<()> {
        let initial = self.stack.len();
        let mut ast = ast;
        'recurse: loop {
            let cur = ast;
            match &cur.kind {
                ExprKind::Apply { target, .. } => {
                    self.stack.push(Frame::new(FrameKind::ApplyTarget, &cur));
                    ast = Rc::clone(target);
                    continue 'recurse;
                }
                ExprKind::Array(elements) => {
                    let (self_obj, offset) = self.stack.get_self_binding();
                    let arr = self.alloc(HeapData::Array(Vec::with_capacity(elements.len())));
                    self.scratch = Value::Array(arr);
                    for element in elements {
                        let env = self.capture(element.free_vars());
                        let th = self.alloc(HeapData::Thunk(ThunkCell::pending_in(
                            self.id_array_element,
                            env,
                            self_obj,
                            offset,
                            Rc::clone(element),
                        )));
                        self.heap.array_mut(arr).push(th);
                    }
                }
                ExprKind::Assert { cond, .. } => {
                    self.stack.push(Frame::new(FrameKind::Assert, &cur));
                    ast = Rc::clone(cond);
                    continue 'recurse;
                }
                ExprKind::Binary { left, .. } => {
                    self.stack.push(Frame::new(FrameKind::BinaryLeft, &cur));
                    ast = Rc::clone(left);
                    continue 'recurse;
                }
                ExprKind::BuiltinFunction(builtin) => {
                    let params: Rc<[Identifier]> = builtin
                        .params()
                        .iter()
                        .map(|p| self.interner.intern(p))
                        .collect();
                    let closure = self.alloc(HeapData::Closure(ClosureCell {
                        env: Bindings::new(),
                        self_obj: None,
                        offset: 0,
                        params,
                        kind: ClosureKind::Builtin(*builtin),
                    }));
                    self.scratch = Value::Function(closure);
                }
                ExprKind::Conditional { cond, .. } => {
                    self.stack.push(Frame::new(FrameKind::If, &cur));
                    ast = Rc::clone(cond);
                    continue 'recurse;
                }
                ExprKind::Error(inner) => {
                    self.stack.push(Frame::new(FrameKind::Error, &cur));
                    ast = Rc::clone(inner);
                    continue 'recurse;
                }
                ExprKind::Function { params, body } => {
                    let env = self.capture(cur.free_vars());
                    let (self_obj, offset) = self.stack.get_self_binding();
                    let closure = self.alloc(HeapData::Closure(ClosureCell {
                        env,
                        self_obj,
                        offset,
                        params: Rc::clone(params),
                        kind: ClosureKind::User {
                            body: Rc::clone(body),
                        },
                    }));
                    self.scratch = Value::Function(closure);
                }
                ExprKind::Import(path) => {
                    let program = self.import_program(&cur.loc, path)?;
                    self.new_call(&cur.loc, None, None, 0, Bindings::new())?;
                    ast = program;
                    continue 'recurse;
                }
                ExprKind::ImportStr(path) => {
                    let resolved = self.import_contents(&cur.loc, path)?;
                    self.scratch = self.make_string(&resolved.contents);
                }
                ExprKind::Index { target, .. } => {
                    self.stack.push(Frame::new(FrameKind::IndexTarget, &cur));
                    ast = Rc::clone(target);
                    continue 'recurse;
                }
                ExprKind::Local { binds, body } => {
                    self.stack.push(Frame::new(FrameKind::Local, &cur));
                    let (self_obj, offset) = self.stack.get_self_binding();
                    // Allocate all thunks first so the bindings can form
                    // cycles; each lands in the frame before the next
                    // allocation so none is collected while building.
                    for (id, init) in binds {
                        let th = self.alloc(HeapData::Thunk(ThunkCell::pending(
                            *id,
                            self_obj,
                            offset,
                            Rc::clone(init),
                        )));
                        self.stack.top_mut().bindings.insert(*id, th);
                    }
                    // Now capture the environments, including the new thunks.
                    for (id, init) in binds {
                        let env = self.capture(init.free_vars());
                        let th = self.stack.top().bindings[id];
                        if let ThunkState::Pending { env: slot, .. } =
                            &mut self.heap.thunk_mut(th).state
                        {
                            *slot = env;
                        }
                    }
                    ast = Rc::clone(body);
                    continue 'recurse;
                }
                ExprKind::LiteralBool(b) => {
                    self.scratch = Value::Bool(*b);
                }
                ExprKind::LiteralNull => {
                    self.scratch = Value::Null;
                }
                ExprKind::LiteralNumber(v) => {
                    self.scratch = self.number_check(&cur.loc, *v)?;
                }
                ExprKind::LiteralString(s) => {
                    self.scratch = self.make_string(s);
                }
                ExprKind::Object { fields, asserts } => {
                    if fields.is_empty() {
                        let env = self.capture(cur.free_vars());
                        let asserts = asserts.clone();
                        let obj = self.alloc(HeapData::Object(ObjectCell::Simple {
                            env,
                            fields: AHashMap::new(),
                            asserts,
                        }));
                        self.scratch = Value::Object(obj);
                    } else {
                        let first = Rc::clone(&fields[0].name);
                        self.stack.push(Frame::new(FrameKind::Object, &cur));
                        ast = first;
                        continue 'recurse;
                    }
                }
                ExprKind::ObjectComp { array, .. } => {
                    self.stack
                        .push(Frame::new(FrameKind::ObjectCompArray, &cur));
                    ast = Rc::clone(array);
                    continue 'recurse;
                }
                ExprKind::SelfExpr => {
                    let (self_obj, _) = self.stack.get_self_binding();
                    let Some(id) = self_obj else {
                        unreachable!("self outside an object survived analysis")
                    };
                    self.scratch = Value::Object(id);
                }
                ExprKind::Super => {
                    let (self_obj, offset) = self.stack.get_self_binding();
                    let Some(root) = self_obj else {
                        unreachable!("super outside an object survived analysis")
                    };
                    let offset = offset + 1;
                    if offset >= self.count_leaves(root) {
                        return Err(self.error(
                            &cur.loc,
                            "Attempt to use super when there is no super class.",
                        ));
                    }
                    let obj = self.alloc(HeapData::Object(ObjectCell::Super { root, offset }));
                    self.scratch = Value::Object(obj);
                }
                ExprKind::Unary { expr, .. } => {
                    self.stack.push(Frame::new(FrameKind::Unary, &cur));
                    ast = Rc::clone(expr);
                    continue 'recurse;
                }
                ExprKind::Var(id) => {
                    let Some(th) = self.stack.lookup_var(*id) else {
                        unreachable!(
                            "unbound variable survived analysis: {}",
                            self.interner.name(*id)
                        )
                    };
                    match &self.heap.thunk(th).state {
                        ThunkState::Filled(v) => {
                            self.scratch = *v;
                        }
                        ThunkState::Pending {
                            env,
                            self_obj,
                            offset,
                            body,
                        } => {
                            let (env, self_obj, offset, body) =
                                (env.clone(), *self_obj, *offset, Rc::clone(body));
                            self.new_call(&cur.loc, Some(th), self_obj, offset, env)?;
                            ast = body;
                            continue 'recurse;
                        }
                    }
                }
            }

            // Unwind: the current expression is done, let the frames decide.
            while self.stack.len() > initial {
                match self.unwind_step()? {
                    Cont::Recurse(next) => {
                        ast = next;
                        continue 'recurse;
                    }
                    Cont::Pop => self.stack.pop(),
                    Cont::Replace => {}
                }
            }
            return Ok(());
        }
    }

    /// Processes the top frame once the current sub-expression has produced
    /// a value in the scratch register.
    fn unwind_step(&mut self) -> RunResult<Cont> {
        let kind = self.stack.top().kind;
        match kind {
            FrameKind::ApplyTarget => self.step_apply_target(),
            FrameKind::Assert => self.step_assert(),
            FrameKind::AssertMsg => {
                let loc = self.stack.top().loc.clone();
                let Value::Str(id) = self.scratch else {
                    return Err(self.error(
                        &loc,
                        format!(
                            "Assert message must be string, got {}.",
                            self.scratch.kind_str()
                        ),
                    ));
                };
                Err(self.error(&loc, self.heap.str_value(id).to_string()))
            }
            FrameKind::BinaryLeft => self.step_binary_left(),
            FrameKind::BinaryRight => self.step_binary_right(),
            FrameKind::BuiltinFilter => self.step_builtin_filter(),
            FrameKind::BuiltinForceThunks => self.step_builtin_force_thunks(),
            FrameKind::Call => self.step_call(),
            FrameKind::EqualityManifest => {
                let loc = self.stack.top().loc.clone();
                let (a, b) = (self.stack.top().val, self.stack.top().val2);
                let eq = self.equality(&loc, a, b)?;
                self.scratch = Value::Bool(eq);
                Ok(Cont::Pop)
            }
            FrameKind::Error => {
                let loc = self.stack.top().loc.clone();
                let Value::Str(id) = self.scratch else {
                    return Err(self.error(
                        &loc,
                        format!(
                            "Error message must be string, got {}.",
                            self.scratch.kind_str()
                        ),
                    ));
                };
                Err(self.error(&loc, self.heap.str_value(id).to_string()))
            }
            FrameKind::If => {
                let node = self.frame_ast();
                let ExprKind::Conditional {
                    then_branch,
                    else_branch,
                    ..
                } = &node.kind
                else {
                    unreachable!("if frame without conditional node")
                };
                let Value::Bool(cond) = self.scratch else {
                    return Err(self.error(
                        &node.loc,
                        format!(
                            "If condition must be boolean, got {}.",
                            self.scratch.kind_str()
                        ),
                    ));
                };
                let branch = if cond {
                    Rc::clone(then_branch)
                } else {
                    Rc::clone(else_branch)
                };
                self.stack.pop();
                Ok(Cont::Recurse(branch))
            }
            FrameKind::IndexTarget => {
                let node = self.frame_ast();
                let ExprKind::Index { index, .. } = &node.kind else {
                    unreachable!("index frame without index node")
                };
                match self.scratch {
                    Value::Array(_) | Value::Object(_) | Value::Str(_) => {}
                    other => {
                        return Err(self.error(
                            &node.loc,
                            format!(
                                "Can only index objects, strings, and arrays, got {}.",
                                other.kind_str()
                            ),
                        ));
                    }
                }
                let index = Rc::clone(index);
                let top = self.stack.top_mut();
                top.kind = FrameKind::IndexIndex;
                top.val = self.scratch;
                Ok(Cont::Recurse(index))
            }
            FrameKind::IndexIndex => self.step_index_index(),
            FrameKind::Local => Ok(Cont::Pop),
            FrameKind::Object => self.step_object(),
            FrameKind::ObjectCompArray => self.step_object_comp_array(),
            FrameKind::ObjectCompElement => self.step_object_comp_element(),
            FrameKind::StringConcat => self.step_string_concat(),
            FrameKind::Unary => self.step_unary(),
        }
    }

    /// The AST node the top frame is continuing.
    fn frame_ast(&self) -> ExprRef {
        self.stack
            .top()
            .ast
            .clone()
            .unwrap_or_else(|| unreachable!("frame kind requires an AST node"))
    }

    fn step_apply_target(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Apply {
            args, tailstrict, ..
        } = &node.kind
        else {
            unreachable!("apply frame without apply node")
        };
        let Value::Function(func_id) = self.scratch else {
            return Err(self.error(
                &node.loc,
                format!("Only functions can be called, got {}", self.scratch.kind_str()),
            ));
        };
        let closure = self.heap.closure(func_id);
        let params = Rc::clone(&closure.params);
        if args.len() != params.len() {
            return Err(self.error(
                &node.loc,
                format!("Expected {} arguments, got {}.", params.len(), args.len()),
            ));
        }
        // Argument thunks are built in the caller's environment.
        let (self_obj, offset) = self.stack.get_self_binding();
        for (i, arg) in args.iter().enumerate() {
            let env = self.capture(arg.free_vars());
            let th = self.alloc(HeapData::Thunk(ThunkCell::pending_in(
                params[i],
                env,
                self_obj,
                offset,
                Rc::clone(arg),
            )));
            self.stack.top_mut().thunks.push(th);
        }
        let arg_thunks = self.stack.top().thunks.clone();
        self.stack.pop();

        let closure = self.heap.closure(func_id);
        match &closure.kind {
            ClosureKind::Builtin(_) => {
                let mut frame = Frame::new(FrameKind::BuiltinForceThunks, &node);
                frame.thunks = arg_thunks;
                frame.val = self.scratch;
                self.stack.push(frame);
                Ok(Cont::Replace)
            }
            ClosureKind::User { body } => {
                let body = Rc::clone(body);
                let (cl_self, cl_offset) = (closure.self_obj, closure.offset);
                let mut bindings = closure.env.clone();
                for (i, &param) in params.iter().enumerate() {
                    bindings.insert(param, arg_thunks[i]);
                }
                self.new_call(&node.loc, Some(func_id), cl_self, cl_offset, bindings)?;
                if *tailstrict {
                    let top = self.stack.top_mut();
                    top.thunks = arg_thunks;
                    top.val = self.scratch;
                    top.tail_call = true;
                    Ok(Cont::Replace)
                } else {
                    Ok(Cont::Recurse(body))
                }
            }
        }
    }

    fn step_assert(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Assert { msg, rest, .. } = &node.kind else {
            unreachable!("assert frame without assert node")
        };
        let Value::Bool(cond) = self.scratch else {
            return Err(self.error(
                &node.loc,
                format!(
                    "Assert condition must be boolean, got {}.",
                    self.scratch.kind_str()
                ),
            ));
        };
        if cond {
            let rest = Rc::clone(rest);
            self.stack.pop();
            return Ok(Cont::Recurse(rest));
        }
        match msg {
            Some(msg) => {
                let msg = Rc::clone(msg);
                self.stack.top_mut().kind = FrameKind::AssertMsg;
                Ok(Cont::Recurse(msg))
            }
            None => Err(self.error(&node.loc, "Assertion failed.")),
        }
    }

    fn step_binary_left(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Binary { op, right, .. } = &node.kind else {
            unreachable!("binary frame without binary node")
        };
        let lhs = self.scratch;
        // Short-circuit semantics for booleans.
        if let Value::Bool(b) = lhs {
            match op {
                BinaryOp::And if !b => {
                    self.scratch = Value::Bool(false);
                    return Ok(Cont::Pop);
                }
                BinaryOp::Or if b => {
                    self.scratch = Value::Bool(true);
                    return Ok(Cont::Pop);
                }
                _ => {}
            }
        }
        let right = Rc::clone(right);
        let top = self.stack.top_mut();
        top.kind = FrameKind::BinaryRight;
        top.val = lhs;
        Ok(Cont::Recurse(right))
    }

    fn step_binary_right(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Binary { op, .. } = &node.kind else {
            unreachable!("binary frame without binary node")
        };
        let op = *op;
        let loc = node.loc.clone();
        let lhs = self.stack.top().val;
        let rhs = self.scratch;

        // String coercion for +.
        if (matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)))
            && op == BinaryOp::Plus
        {
            let top = self.stack.top_mut();
            top.kind = FrameKind::StringConcat;
            top.val2 = rhs;
            return Ok(Cont::Replace);
        }
        // Equality is allowed between mismatched types.
        if op == BinaryOp::ManifestEqual {
            let top = self.stack.top_mut();
            top.kind = FrameKind::EqualityManifest;
            top.val2 = rhs;
            return Ok(Cont::Replace);
        }
        if lhs.kind_str() != rhs.kind_str() {
            return Err(self.error(
                &loc,
                format!(
                    "Binary operator {op} requires matching types, got {} and {}.",
                    lhs.kind_str(),
                    rhs.kind_str()
                ),
            ));
        }
        match (lhs, rhs) {
            (Value::Array(l), Value::Array(r)) => {
                if op != BinaryOp::Plus {
                    return Err(
                        self.error(&loc, format!("Binary operator {op} does not operate on arrays."))
                    );
                }
                let mut elements = self.heap.array(l).clone();
                elements.extend(self.heap.array(r).iter().copied());
                let arr = self.alloc(HeapData::Array(elements));
                self.scratch = Value::Array(arr);
            }
            (Value::Bool(l), Value::Bool(r)) => {
                self.scratch = match op {
                    BinaryOp::And => Value::Bool(l && r),
                    BinaryOp::Or => Value::Bool(l || r),
                    _ => {
                        return Err(self.error(
                            &loc,
                            format!("Binary operator {op} does not operate on booleans."),
                        ));
                    }
                };
            }
            (Value::Number(l), Value::Number(r)) => {
                self.scratch = match op {
                    BinaryOp::Plus => self.number_check(&loc, l + r)?,
                    BinaryOp::Minus => self.number_check(&loc, l - r)?,
                    BinaryOp::Mult => self.number_check(&loc, l * r)?,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return Err(self.error(&loc, "Division by zero."));
                        }
                        self.number_check(&loc, l / r)?
                    }
                    BinaryOp::ShiftL => {
                        let (li, ri) =
                            (self.to_safe_integer(&loc, l)?, self.to_safe_integer(&loc, r)?);
                        Value::Number((li << (ri & 63)) as f64)
                    }
                    BinaryOp::ShiftR => {
                        let (li, ri) =
                            (self.to_safe_integer(&loc, l)?, self.to_safe_integer(&loc, r)?);
                        Value::Number((li >> (ri & 63)) as f64)
                    }
                    BinaryOp::BitwiseAnd => {
                        let (li, ri) =
                            (self.to_safe_integer(&loc, l)?, self.to_safe_integer(&loc, r)?);
                        Value::Number((li & ri) as f64)
                    }
                    BinaryOp::BitwiseXor => {
                        let (li, ri) =
                            (self.to_safe_integer(&loc, l)?, self.to_safe_integer(&loc, r)?);
                        Value::Number((li ^ ri) as f64)
                    }
                    BinaryOp::BitwiseOr => {
                        let (li, ri) =
                            (self.to_safe_integer(&loc, l)?, self.to_safe_integer(&loc, r)?);
                        Value::Number((li | ri) as f64)
                    }
                    BinaryOp::Less => Value::Bool(l < r),
                    BinaryOp::LessEq => Value::Bool(l <= r),
                    BinaryOp::Greater => Value::Bool(l > r),
                    BinaryOp::GreaterEq => Value::Bool(l >= r),
                    _ => {
                        return Err(self.error(
                            &loc,
                            format!("Binary operator {op} does not operate on numbers."),
                        ));
                    }
                };
            }
            (Value::Function(_), Value::Function(_)) => {
                return Err(self.error(
                    &loc,
                    format!("Binary operator {op} does not operate on functions."),
                ));
            }
            (Value::Null, Value::Null) => {
                return Err(
                    self.error(&loc, format!("Binary operator {op} does not operate on null."))
                );
            }
            (Value::Object(l), Value::Object(r)) => {
                if op != BinaryOp::Plus {
                    return Err(self.error(
                        &loc,
                        format!("Binary operator {op} does not operate on objects."),
                    ));
                }
                let obj = self.alloc(HeapData::Object(ObjectCell::Extended { left: l, right: r }));
                self.scratch = Value::Object(obj);
            }
            (Value::Str(l), Value::Str(r)) => {
                let ls = Rc::clone(self.heap.str_value(l));
                let rs = Rc::clone(self.heap.str_value(r));
                self.scratch = match op {
                    BinaryOp::Plus => {
                        let joined = format!("{ls}{rs}");
                        self.make_string(&joined)
                    }
                    BinaryOp::Less => Value::Bool(ls < rs),
                    BinaryOp::LessEq => Value::Bool(ls <= rs),
                    BinaryOp::Greater => Value::Bool(ls > rs),
                    BinaryOp::GreaterEq => Value::Bool(ls >= rs),
                    _ => {
                        return Err(self.error(
                            &loc,
                            format!("Binary operator {op} does not operate on strings."),
                        ));
                    }
                };
            }
            _ => unreachable!("matching types diverged in binary operator"),
        }
        Ok(Cont::Pop)
    }

    fn step_builtin_filter(&mut self) -> RunResult<Cont> {
        let loc = self.stack.top().loc.clone();
        let Value::Function(func_id) = self.stack.top().val else {
            unreachable!("filter frame lost its function")
        };
        let Value::Array(arr_id) = self.stack.top().val2 else {
            unreachable!("filter frame lost its array")
        };
        let Value::Bool(keep) = self.scratch else {
            return Err(self.error(
                &loc,
                format!(
                    "filter function must return boolean, got: {}",
                    self.scratch.kind_str()
                ),
            ));
        };
        let cursor = self.stack.top().cursor;
        if keep {
            let element = self.heap.array(arr_id)[cursor];
            self.stack.top_mut().thunks.push(element);
        }
        let cursor = cursor + 1;
        self.stack.top_mut().cursor = cursor;
        let len = self.heap.array(arr_id).len();
        if cursor == len {
            let kept = self.stack.top().thunks.clone();
            let arr = self.alloc(HeapData::Array(kept));
            self.scratch = Value::Array(arr);
            Ok(Cont::Pop)
        } else {
            let element = self.heap.array(arr_id)[cursor];
            let closure = self.heap.closure(func_id);
            let mut bindings = closure.env.clone();
            bindings.insert(closure.params[0], element);
            let (cl_self, cl_offset) = (closure.self_obj, closure.offset);
            let ClosureKind::User { body } = &closure.kind else {
                unreachable!("filter over a builtin function")
            };
            let body = Rc::clone(body);
            self.new_call(&loc, Some(func_id), cl_self, cl_offset, bindings)?;
            Ok(Cont::Recurse(body))
        }
    }

    fn step_builtin_force_thunks(&mut self) -> RunResult<Cont> {
        let loc = self.stack.top().loc.clone();
        let cursor = self.stack.top().cursor;
        if cursor == self.stack.top().thunks.len() {
            // All arguments forced; dispatch on the builtin id.
            let Value::Function(func_id) = self.stack.top().val else {
                unreachable!("builtin frame lost its function")
            };
            let ClosureKind::Builtin(builtin) = &self.heap.closure(func_id).kind else {
                unreachable!("builtin frame holds a user function")
            };
            let builtin = *builtin;
            let args: ArgValues = self
                .stack
                .top()
                .thunks
                .iter()
                .map(|&th| {
                    self.heap
                        .thunk(th)
                        .content()
                        .unwrap_or_else(|| unreachable!("builtin argument left unforced"))
                })
                .collect();
            self.dispatch_builtin(builtin, &args, &loc)
        } else {
            self.stack.top_mut().cursor = cursor + 1;
            let th = self.stack.top().thunks[cursor];
            match &self.heap.thunk(th).state {
                ThunkState::Filled(_) => Ok(Cont::Replace),
                ThunkState::Pending {
                    env,
                    self_obj,
                    offset,
                    body,
                } => {
                    let (env, self_obj, offset, body) =
                        (env.clone(), *self_obj, *offset, Rc::clone(body));
                    self.new_call(&loc, Some(th), self_obj, offset, env)?;
                    Ok(Cont::Recurse(body))
                }
            }
        }
    }

    fn step_call(&mut self) -> RunResult<Cont> {
        let Some(context) = self.stack.top().context else {
            return Ok(Cont::Pop);
        };
        match self.heap.get(context) {
            HeapData::Thunk(_) => {
                // A forced thunk memoises its result.
                let value = self.scratch;
                self.heap.thunk_mut(context).fill(value);
                Ok(Cont::Pop)
            }
            HeapData::Closure(closure) => {
                let cursor = self.stack.top().cursor;
                let n = self.stack.top().thunks.len();
                if cursor < n {
                    // Tail-strict: force each argument in order.
                    let ClosureKind::User { .. } = closure.kind else {
                        unreachable!("tail-strict call of a builtin")
                    };
                    self.stack.top_mut().cursor = cursor + 1;
                    let th = self.stack.top().thunks[cursor];
                    let loc = self.stack.top().loc.clone();
                    match &self.heap.thunk(th).state {
                        ThunkState::Filled(_) => Ok(Cont::Replace),
                        ThunkState::Pending {
                            env,
                            self_obj,
                            offset,
                            body,
                        } => {
                            let (env, self_obj, offset, body) =
                                (env.clone(), *self_obj, *offset, Rc::clone(body));
                            self.new_call(&loc, Some(th), self_obj, offset, env)?;
                            Ok(Cont::Recurse(body))
                        }
                    }
                } else if n == 0 {
                    // Body has now been executed; result is in scratch.
                    Ok(Cont::Pop)
                } else {
                    // Arguments forced; run the body in this same frame.
                    let ClosureKind::User { body } = &closure.kind else {
                        unreachable!("tail-strict call of a builtin")
                    };
                    let body = Rc::clone(body);
                    let top = self.stack.top_mut();
                    top.thunks.clear();
                    top.cursor = 0;
                    Ok(Cont::Recurse(body))
                }
            }
            // Object-leaf contexts (field evaluation) need no completion.
            _ => Ok(Cont::Pop),
        }
    }

    fn step_index_index(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let loc = node.loc.clone();
        let target = self.stack.top().val;
        match target {
            Value::Array(arr_id) => {
                let Value::Number(index) = self.scratch else {
                    return Err(self.error(
                        &loc,
                        format!("Array index must be number, got {}.", self.scratch.kind_str()),
                    ));
                };
                let i = index as i64;
                let len = self.heap.array(arr_id).len() as i64;
                if i < 0 || i >= len {
                    return Err(self.error(
                        &loc,
                        format!("Array bounds error: {i} not within [0, {len})"),
                    ));
                }
                let th = self.heap.array(arr_id)[i as usize];
                match &self.heap.thunk(th).state {
                    ThunkState::Filled(v) => {
                        self.scratch = *v;
                        Ok(Cont::Pop)
                    }
                    ThunkState::Pending {
                        env,
                        self_obj,
                        offset,
                        body,
                    } => {
                        let (env, self_obj, offset, body) =
                            (env.clone(), *self_obj, *offset, Rc::clone(body));
                        self.stack.pop();
                        self.new_call(&loc, Some(th), self_obj, offset, env)?;
                        Ok(Cont::Recurse(body))
                    }
                }
            }
            Value::Object(obj_id) => {
                let Value::Str(index_id) = self.scratch else {
                    return Err(self.error(
                        &loc,
                        format!("Object index must be string, got {}.", self.scratch.kind_str()),
                    ));
                };
                let name = Rc::clone(self.heap.str_value(index_id));
                let fid = self.interner.intern(&name);
                self.stack.pop();
                let body = self.object_index(&loc, obj_id, fid)?;
                Ok(Cont::Recurse(body))
            }
            Value::Str(str_id) => {
                let Value::Number(index) = self.scratch else {
                    return Err(self.error(
                        &loc,
                        format!(
                            "String index must be a number, got {}.",
                            self.scratch.kind_str()
                        ),
                    ));
                };
                let i = index as i64;
                let s = Rc::clone(self.heap.str_value(str_id));
                let picked = if i < 0 {
                    None
                } else {
                    s.chars().nth(i as usize)
                };
                let Some(c) = picked else {
                    let len = s.chars().count();
                    return Err(self.error(
                        &loc,
                        format!("String bounds error: {i} not within [0, {len})"),
                    ));
                };
                self.scratch = self.make_string(&c.to_string());
                Ok(Cont::Pop)
            }
            _ => unreachable!("index target was validated"),
        }
    }

    fn step_object(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Object { fields, asserts } = &node.kind else {
            unreachable!("object frame without object node")
        };
        let cursor = self.stack.top().cursor;
        match self.scratch {
            // A null field name omits the field.
            Value::Null => {}
            Value::Str(name_id) => {
                let name = Rc::clone(self.heap.str_value(name_id));
                let fid = self.interner.intern(&name);
                if self.stack.top().fields.contains_key(&fid) {
                    return Err(
                        self.error(&node.loc, format!("Duplicate field name: \"{name}\""))
                    );
                }
                let declared = &fields[cursor];
                let field = SimpleField {
                    hide: declared.hide,
                    body: Rc::clone(&declared.body),
                };
                self.stack.top_mut().fields.insert(fid, field);
            }
            other => {
                return Err(self.error(
                    &node.loc,
                    format!("Field name was not a string, got {}.", other.kind_str()),
                ));
            }
        }
        let cursor = cursor + 1;
        self.stack.top_mut().cursor = cursor;
        if cursor < fields.len() {
            Ok(Cont::Recurse(Rc::clone(&fields[cursor].name)))
        } else {
            let env = self.capture(node.free_vars());
            let collected = std::mem::take(&mut self.stack.top_mut().fields);
            let obj = self.alloc(HeapData::Object(ObjectCell::Simple {
                env,
                fields: collected,
                asserts: asserts.clone(),
            }));
            self.scratch = Value::Object(obj);
            Ok(Cont::Pop)
        }
    }

    fn step_object_comp_array(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::ObjectComp {
            field, value, id, ..
        } = &node.kind
        else {
            unreachable!("comprehension frame without comprehension node")
        };
        let Value::Array(arr_id) = self.scratch else {
            return Err(self.error(
                &node.loc,
                format!(
                    "Object comprehension needs array, got {}",
                    self.scratch.kind_str()
                ),
            ));
        };
        if self.heap.array(arr_id).is_empty() {
            let obj = self.alloc(HeapData::Object(ObjectCell::Comprehension {
                env: Bindings::new(),
                value: Rc::clone(value),
                id: *id,
                elements: AHashMap::new(),
            }));
            self.scratch = Value::Object(obj);
            return Ok(Cont::Pop);
        }
        let first = self.heap.array(arr_id)[0];
        let field = Rc::clone(field);
        let id = *id;
        let top = self.stack.top_mut();
        top.kind = FrameKind::ObjectCompElement;
        top.val = self.scratch;
        top.cursor = 0;
        top.bindings.insert(id, first);
        Ok(Cont::Recurse(field))
    }

    fn step_object_comp_element(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::ObjectComp {
            field, value, id, ..
        } = &node.kind
        else {
            unreachable!("comprehension frame without comprehension node")
        };
        let Value::Array(arr_id) = self.stack.top().val else {
            unreachable!("comprehension frame lost its array")
        };
        let Value::Str(name_id) = self.scratch else {
            return Err(self.error(
                &node.loc,
                format!("Field name must be string, got: {}", self.scratch.kind_str()),
            ));
        };
        let name = Rc::clone(self.heap.str_value(name_id));
        let fid = self.interner.intern(&name);
        if self.stack.top().elements.contains_key(&fid) {
            return Err(self.error(&node.loc, format!("Duplicate field name: \"{name}\"")));
        }
        let cursor = self.stack.top().cursor;
        let element = self.heap.array(arr_id)[cursor];
        let top = self.stack.top_mut();
        top.elements.insert(fid, element);
        top.cursor = cursor + 1;
        let cursor = cursor + 1;
        if cursor == self.heap.array(arr_id).len() {
            let env = self.capture(node.free_vars());
            let elements = std::mem::take(&mut self.stack.top_mut().elements);
            let obj = self.alloc(HeapData::Object(ObjectCell::Comprehension {
                env,
                value: Rc::clone(value),
                id: *id,
                elements,
            }));
            self.scratch = Value::Object(obj);
            Ok(Cont::Pop)
        } else {
            let next = self.heap.array(arr_id)[cursor];
            self.stack.top_mut().bindings.insert(*id, next);
            Ok(Cont::Recurse(Rc::clone(field)))
        }
    }

    fn step_string_concat(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Binary { left, right, .. } = &node.kind else {
            unreachable!("concat frame without binary node")
        };
        let (left_loc, right_loc) = (left.loc.clone(), right.loc.clone());
        let lhs = self.stack.top().val;
        let rhs = self.stack.top().val2;
        let left_str = match lhs {
            Value::Str(id) => self.heap.str_value(id).to_string(),
            other => {
                self.scratch = other;
                self.to_display_string(&left_loc)?
            }
        };
        let right_str = match rhs {
            Value::Str(id) => self.heap.str_value(id).to_string(),
            other => {
                self.scratch = other;
                self.to_display_string(&right_loc)?
            }
        };
        let joined = format!("{left_str}{right_str}");
        self.scratch = self.make_string(&joined);
        Ok(Cont::Pop)
    }

    fn step_unary(&mut self) -> RunResult<Cont> {
        let node = self.frame_ast();
        let ExprKind::Unary { op, .. } = &node.kind else {
            unreachable!("unary frame without unary node")
        };
        let loc = node.loc.clone();
        match self.scratch {
            Value::Bool(b) => {
                if *op == UnaryOp::Not {
                    self.scratch = Value::Bool(!b);
                } else {
                    return Err(self.error(
                        &loc,
                        format!("Unary operator {op} does not operate on booleans."),
                    ));
                }
            }
            Value::Number(v) => match op {
                UnaryOp::Plus => {}
                UnaryOp::Minus => {
                    self.scratch = Value::Number(-v);
                }
                UnaryOp::BitwiseNot => {
                    let i = self.to_safe_integer(&loc, v)?;
                    self.scratch = Value::Number(!i as f64);
                }
                UnaryOp::Not => {
                    return Err(self.error(
                        &loc,
                        format!("Unary operator {op} does not operate on numbers."),
                    ));
                }
            },
            other => {
                return Err(self.error(
                    &loc,
                    format!(
                        "Unary operator {op} does not operate on type {}",
                        other.kind_str()
                    ),
                ));
            }
        }
        Ok(Cont::Pop)
    }

    fn check_builtin_args(
        &self,
        loc: &LocationRange,
        builtin: Builtin,
        args: &[Value],
        expected: &[&str],
    ) -> RunResult<()> {
        let ok = args.len() == expected.len()
            && args
                .iter()
                .zip(expected)
                .all(|(arg, want)| arg.kind_str() == *want);
        if ok {
            return Ok(());
        }
        let got: Vec<&str> = args.iter().map(|a| a.kind_str()).collect();
        Err(self.error(
            loc,
            format!(
                "Builtin function {} expected ({}) but got ({})",
                builtin.name(),
                expected.join(", "),
                got.join(", ")
            ),
        ))
    }

    fn math_unary(
        &mut self,
        loc: &LocationRange,
        builtin: Builtin,
        args: &[Value],
        f: fn(f64) -> f64,
    ) -> RunResult<Cont> {
        self.check_builtin_args(loc, builtin, args, &["number"])?;
        let Value::Number(x) = args[0] else {
            unreachable!("checked argument type")
        };
        self.scratch = self.number_check(loc, f(x))?;
        Ok(Cont::Pop)
    }

    /// Executes a builtin once every argument thunk has been forced. The
    /// caller's frame (still on the stack) keeps the arguments reachable.
    fn dispatch_builtin(
        &mut self,
        builtin: Builtin,
        args: &ArgValues,
        loc: &LocationRange,
    ) -> RunResult<Cont> {
        match builtin {
            Builtin::MakeArray => {
                self.check_builtin_args(loc, builtin, args, &["number", "function"])?;
                let (Value::Number(sz), Value::Function(func_id)) = (args[0], args[1]) else {
                    unreachable!("checked argument types")
                };
                let sz = sz as i64;
                if sz < 0 {
                    return Err(
                        self.error(loc, format!("makeArray requires size >= 0, got {sz}"))
                    );
                }
                let closure = self.heap.closure(func_id);
                if closure.params.len() != 1 {
                    return Err(self.error(
                        loc,
                        format!(
                            "makeArray function must take 1 param, got: {}",
                            closure.params.len()
                        ),
                    ));
                }
                let ClosureKind::User { body } = &closure.kind else {
                    return Err(self.error(loc, "makeArray function must not be a builtin."));
                };
                let body = Rc::clone(body);
                let param = closure.params[0];
                let (cl_self, cl_offset) = (closure.self_obj, closure.offset);
                let env = closure.env.clone();
                let mut elements = Vec::with_capacity(sz as usize);
                for i in 0..sz {
                    let th = self.alloc(HeapData::Thunk(ThunkCell::pending(
                        self.id_array_element,
                        cl_self,
                        cl_offset,
                        Rc::clone(&body),
                    )));
                    // Keep the fresh thunk reachable through this frame.
                    self.stack.top_mut().thunks.push(th);
                    let el = self.alloc(HeapData::Thunk(ThunkCell::filled(
                        param,
                        Value::Number(i as f64),
                    )));
                    let mut th_env = env.clone();
                    th_env.insert(param, el);
                    if let ThunkState::Pending { env: slot, .. } =
                        &mut self.heap.thunk_mut(th).state
                    {
                        *slot = th_env;
                    }
                    elements.push(th);
                }
                let arr = self.alloc(HeapData::Array(elements));
                self.scratch = Value::Array(arr);
                Ok(Cont::Pop)
            }
            Builtin::Pow => {
                self.check_builtin_args(loc, builtin, args, &["number", "number"])?;
                let (Value::Number(x), Value::Number(n)) = (args[0], args[1]) else {
                    unreachable!("checked argument types")
                };
                self.scratch = self.number_check(loc, x.powf(n))?;
                Ok(Cont::Pop)
            }
            Builtin::Floor => self.math_unary(loc, builtin, args, f64::floor),
            Builtin::Ceil => self.math_unary(loc, builtin, args, f64::ceil),
            Builtin::Sqrt => self.math_unary(loc, builtin, args, f64::sqrt),
            Builtin::Sin => self.math_unary(loc, builtin, args, f64::sin),
            Builtin::Cos => self.math_unary(loc, builtin, args, f64::cos),
            Builtin::Tan => self.math_unary(loc, builtin, args, f64::tan),
            Builtin::Asin => self.math_unary(loc, builtin, args, f64::asin),
            Builtin::Acos => self.math_unary(loc, builtin, args, f64::acos),
            Builtin::Atan => self.math_unary(loc, builtin, args, f64::atan),
            Builtin::Log => self.math_unary(loc, builtin, args, f64::ln),
            Builtin::Exp => self.math_unary(loc, builtin, args, f64::exp),
            Builtin::Mantissa => {
                self.check_builtin_args(loc, builtin, args, &["number"])?;
                let Value::Number(x) = args[0] else {
                    unreachable!("checked argument type")
                };
                let (mantissa, _) = frexp(x);
                self.scratch = self.number_check(loc, mantissa)?;
                Ok(Cont::Pop)
            }
            Builtin::Exponent => {
                self.check_builtin_args(loc, builtin, args, &["number"])?;
                let Value::Number(x) = args[0] else {
                    unreachable!("checked argument type")
                };
                let (_, exponent) = frexp(x);
                self.scratch = self.number_check(loc, f64::from(exponent))?;
                Ok(Cont::Pop)
            }
            Builtin::Modulo => {
                self.check_builtin_args(loc, builtin, args, &["number", "number"])?;
                let (Value::Number(a), Value::Number(b)) = (args[0], args[1]) else {
                    unreachable!("checked argument types")
                };
                if b == 0.0 {
                    return Err(self.error(loc, "Division by zero."));
                }
                self.scratch = self.number_check(loc, a % b)?;
                Ok(Cont::Pop)
            }
            Builtin::Type => {
                if args.len() != 1 {
                    return Err(self.error(loc, "type takes 1 parameter."));
                }
                self.scratch = self.make_string(args[0].kind_str());
                Ok(Cont::Pop)
            }
            Builtin::Filter => {
                self.check_builtin_args(loc, builtin, args, &["function", "array"])?;
                let (Value::Function(func_id), Value::Array(arr_id)) = (args[0], args[1]) else {
                    unreachable!("checked argument types")
                };
                let closure = self.heap.closure(func_id);
                if closure.params.len() != 1 {
                    return Err(self.error(loc, "filter function takes 1 parameter."));
                }
                let ClosureKind::User { body } = &closure.kind else {
                    return Err(self.error(loc, "filter function must not be a builtin."));
                };
                let body = Rc::clone(body);
                if self.heap.array(arr_id).is_empty() {
                    let arr = self.alloc(HeapData::Array(Vec::new()));
                    self.scratch = Value::Array(arr);
                    return Ok(Cont::Pop);
                }
                let element = self.heap.array(arr_id)[0];
                let closure = self.heap.closure(func_id);
                let mut bindings = closure.env.clone();
                bindings.insert(closure.params[0], element);
                let (cl_self, cl_offset) = (closure.self_obj, closure.offset);
                let top = self.stack.top_mut();
                top.kind = FrameKind::BuiltinFilter;
                top.val = args[0];
                top.val2 = args[1];
                top.thunks.clear();
                top.cursor = 0;
                self.new_call(loc, Some(func_id), cl_self, cl_offset, bindings)?;
                Ok(Cont::Recurse(body))
            }
            Builtin::ObjectHas => {
                self.check_builtin_args(loc, builtin, args, &["object", "string"])?;
                let (Value::Object(obj), Value::Str(name_id)) = (args[0], args[1]) else {
                    unreachable!("checked argument types")
                };
                let name = Rc::clone(self.heap.str_value(name_id));
                let found = self
                    .visible_fields(obj)
                    .into_iter()
                    .any(|id| self.interner.name(id) == &*name);
                self.scratch = Value::Bool(found);
                Ok(Cont::Pop)
            }
            Builtin::Length => {
                if args.len() != 1 {
                    return Err(self.error(loc, "length takes 1 parameter."));
                }
                let len = match args[0] {
                    Value::Object(obj) => self.visible_fields(obj).len(),
                    Value::Array(arr) => self.heap.array(arr).len(),
                    Value::Str(s) => self.heap.str_value(s).chars().count(),
                    Value::Function(f) => self.heap.closure(f).params.len(),
                    other => {
                        return Err(self.error(
                            loc,
                            format!(
                                "length operates on strings, objects, functions and arrays, got {}",
                                other.kind_str()
                            ),
                        ));
                    }
                };
                self.scratch = Value::Number(len as f64);
                Ok(Cont::Pop)
            }
            Builtin::ObjectFields => {
                self.check_builtin_args(loc, builtin, args, &["object"])?;
                let Value::Object(obj) = args[0] else {
                    unreachable!("checked argument type")
                };
                let names = self.visible_field_names(obj);
                let arr = self.alloc(HeapData::Array(Vec::with_capacity(names.len())));
                self.scratch = Value::Array(arr);
                for name in names {
                    let th = self.alloc(HeapData::Thunk(ThunkCell::filled(
                        self.id_array_element,
                        Value::Null,
                    )));
                    self.heap.array_mut(arr).push(th);
                    let s = self.make_string(&name);
                    self.heap.thunk_mut(th).fill(s);
                }
                Ok(Cont::Pop)
            }
            Builtin::Codepoint => {
                self.check_builtin_args(loc, builtin, args, &["string"])?;
                let Value::Str(s) = args[0] else {
                    unreachable!("checked argument type")
                };
                let s = Rc::clone(self.heap.str_value(s));
                let mut chars = s.chars();
                let (first, rest) = (chars.next(), chars.next());
                match (first, rest) {
                    (Some(c), None) => {
                        self.scratch = Value::Number(f64::from(u32::from(c)));
                        Ok(Cont::Pop)
                    }
                    _ => Err(self.error(
                        loc,
                        format!(
                            "codepoint takes a string of length 1, got length {}",
                            s.chars().count()
                        ),
                    )),
                }
            }
            Builtin::Char => {
                self.check_builtin_args(loc, builtin, args, &["number"])?;
                let Value::Number(n) = args[0] else {
                    unreachable!("checked argument type")
                };
                let n = n as i64;
                if n < 0 {
                    return Err(self.error(loc, format!("Codepoints must be >= 0, got {n}")));
                }
                let c = u32::try_from(n).ok().and_then(char::from_u32);
                let Some(c) = c else {
                    return Err(
                        self.error(loc, format!("Invalid unicode codepoint, got {n}"))
                    );
                };
                self.scratch = self.make_string(&c.to_string());
                Ok(Cont::Pop)
            }
            Builtin::ExtVar => {
                self.check_builtin_args(loc, builtin, args, &["string"])?;
                let Value::Str(name_id) = args[0] else {
                    unreachable!("checked argument type")
                };
                let name = Rc::clone(self.heap.str_value(name_id));
                match self.ext_vars.get(&*name) {
                    None => Err(self.error(
                        loc,
                        format!("Undefined external variable: {name}"),
                    )),
                    Some(ExtEntry::Str(s)) => {
                        let s = Rc::clone(s);
                        self.scratch = self.make_string(&s);
                        Ok(Cont::Pop)
                    }
                    Some(ExtEntry::Code(th)) => {
                        let th = *th;
                        match &self.heap.thunk(th).state {
                            ThunkState::Filled(v) => {
                                self.scratch = *v;
                                Ok(Cont::Pop)
                            }
                            ThunkState::Pending {
                                env,
                                self_obj,
                                offset,
                                body,
                            } => {
                                let (env, self_obj, offset, body) =
                                    (env.clone(), *self_obj, *offset, Rc::clone(body));
                                self.new_call(loc, Some(th), self_obj, offset, env)?;
                                Ok(Cont::Recurse(body))
                            }
                        }
                    }
                }
            }
            Builtin::Slice => self.builtin_slice(loc, args),
            Builtin::Format => self.builtin_format(loc, args),
        }
    }

    /// `std.slice(indexable, index, end, step)`: codepoint slicing for
    /// strings, thunk-list slicing for arrays. Bounds may be null.
    fn builtin_slice(&mut self, loc: &LocationRange, args: &ArgValues) -> RunResult<Cont> {
        let bound = |vm: &Self, v: Value, default: i64| -> RunResult<i64> {
            match v {
                Value::Null => Ok(default),
                Value::Number(n) => {
                    let n = n as i64;
                    if n < 0 {
                        return Err(vm.error(loc, format!("slice index must be >= 0, got {n}")));
                    }
                    Ok(n)
                }
                other => Err(vm.error(
                    loc,
                    format!("slice index must be number or null, got {}", other.kind_str()),
                )),
            }
        };
        let step = match args[3] {
            Value::Null => 1,
            Value::Number(n) => {
                let n = n as i64;
                if n < 1 {
                    return Err(self.error(loc, format!("slice step must be >= 1, got {n}")));
                }
                n
            }
            other => {
                return Err(self.error(
                    loc,
                    format!("slice step must be number or null, got {}", other.kind_str()),
                ));
            }
        };
        match args[0] {
            Value::Str(s) => {
                let s = Rc::clone(self.heap.str_value(s));
                let len = s.chars().count() as i64;
                let from = bound(self, args[1], 0)?;
                let to = bound(self, args[2], len)?.min(len);
                let mut out = String::new();
                if from < to {
                    for (i, c) in s.chars().enumerate() {
                        let i = i as i64;
                        if i >= to {
                            break;
                        }
                        if i >= from && (i - from) % step == 0 {
                            out.push(c);
                        }
                    }
                }
                self.scratch = self.make_string(&out);
                Ok(Cont::Pop)
            }
            Value::Array(arr) => {
                let elements = self.heap.array(arr).clone();
                let len = elements.len() as i64;
                let from = bound(self, args[1], 0)?;
                let to = bound(self, args[2], len)?.min(len);
                let mut out = Vec::new();
                let mut i = from;
                while i < to {
                    out.push(elements[i as usize]);
                    i += step;
                }
                let sliced = self.alloc(HeapData::Array(out));
                self.scratch = Value::Array(sliced);
                Ok(Cont::Pop)
            }
            other => Err(self.error(
                loc,
                format!("slice operates on strings and arrays, got {}", other.kind_str()),
            )),
        }
    }
}

/// Decomposes a finite double into mantissa in [0.5, 1) and exponent, such
/// that `m * 2^e == v`. Zero decomposes to (0, 0).
pub(crate) fn frexp(v: f64) -> (f64, i32) {
    if v == 0.0 || !v.is_finite() {
        return (v, 0);
    }
    let bits = v.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i32;
    if exp_bits == 0 {
        // Subnormal: scale into the normal range first.
        let (m, e) = frexp(v * f64::from_bits(0x4330_0000_0000_0000));
        return (m, e - 52);
    }
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (0x3feu64 << 52));
    (mantissa, exp_bits - 1022)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frexp_matches_libc_behaviour() {
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(0.5), (0.5, 0));
        assert_eq!(frexp(-8.0), (-0.5, 4));
        assert_eq!(frexp(0.0), (0.0, 0));
        let (m, e) = frexp(3.7);
        assert!((m * 2f64.powi(e) - 3.7).abs() < 1e-15);
    }
}
