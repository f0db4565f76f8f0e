//! Arena-allocated AST for type-checked Weft modules.
//!
//! The parser and type checker live upstream of this crate: modules arrive
//! fully resolved, with every name reference pointing at its definition and
//! every expression's concrete type recorded in a [`crate::types::TypeInfo`]
//! table. Node identity is an arena index scoped by module, which the
//! converter uses as the key for its node-to-IR value table.

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// Stable identity of an AST node: the owning module plus its arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AstNodeId {
    pub module: ModuleId,
    pub index: u32,
}

/// Zero-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub lineno: u32,
    pub colno: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Pos,
    pub limit: Pos,
}

impl Span {
    pub fn new(start: Pos, limit: Pos) -> Self {
        Span { start, limit }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.lineno + 1,
            self.start.colno + 1,
            self.limit.lineno + 1,
            self.limit.colno + 1
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnopKind {
    Negate,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
    Shrl,
    Shll,
    Shra,
    And,
    Or,
    Xor,
    LogicalAnd,
    LogicalOr,
    Concat,
}

/// Width/signedness annotation attached directly to a number literal
/// (e.g. the `s8` in `s8:0`). Some builtins read this annotation rather
/// than the number's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTypeAnnotation {
    pub signed: bool,
    pub bit_count: u64,
}

#[derive(Debug, Clone)]
pub struct Number {
    pub value: i128,
    pub type_annotation: Option<BuiltinTypeAnnotation>,
}

#[derive(Debug, Clone)]
pub struct NameDef {
    pub identifier: String,
}

#[derive(Debug, Clone)]
pub struct NameRef {
    pub identifier: String,
    pub name_def: AstNodeId,
}

/// `subject::attr` — a reference through an import or a nominal type name
/// (imported constant, enum member).
#[derive(Debug, Clone)]
pub struct ColonRef {
    /// A `NameRef` node naming either an import or a type definition.
    pub subject: AstNodeId,
    pub attr: String,
}

#[derive(Debug, Clone)]
pub struct Unop {
    pub kind: UnopKind,
    pub operand: AstNodeId,
}

#[derive(Debug, Clone)]
pub struct Binop {
    pub kind: BinopKind,
    pub lhs: AstNodeId,
    pub rhs: AstNodeId,
}

#[derive(Debug, Clone)]
pub struct Ternary {
    pub test: AstNodeId,
    pub consequent: AstNodeId,
    pub alternate: AstNodeId,
}

/// `expr as T` — the target type is recorded on the cast node itself in the
/// type table.
#[derive(Debug, Clone)]
pub struct Cast {
    pub expr: AstNodeId,
}

#[derive(Debug, Clone)]
pub struct TupleExpr {
    pub members: Vec<AstNodeId>,
}

#[derive(Debug, Clone)]
pub struct ArrayExpr {
    pub members: Vec<AstNodeId>,
    /// Trailing `...`: the last element is repeated up to the annotated size.
    pub has_ellipsis: bool,
}

/// `x[a:b]` bounds. Resolution of negative/omitted endpoints happens during
/// type checking; the converter reads the resolved bounds from the type
/// table keyed by this node.
#[derive(Debug, Clone)]
pub struct Slice {
    pub start: Option<AstNodeId>,
    pub limit: Option<AstNodeId>,
}

/// `x[start +: T]` — a slice whose start is a dynamic expression and whose
/// width comes from the annotated type of the whole index expression.
#[derive(Debug, Clone)]
pub struct WidthSlice {
    pub start: AstNodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRhs {
    /// Plain index expression (array subscript or constant tuple index).
    Value(AstNodeId),
    /// A `Slice` node.
    Slice(AstNodeId),
    /// A `WidthSlice` node.
    Width(AstNodeId),
}

#[derive(Debug, Clone)]
pub struct IndexExpr {
    pub lhs: AstNodeId,
    pub rhs: IndexRhs,
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub lhs: AstNodeId,
    pub attr: String,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub callee: AstNodeId,
    pub args: Vec<AstNodeId>,
}

#[derive(Debug, Clone)]
pub struct Let {
    /// A `NameDefTree` node.
    pub name_def_tree: AstNodeId,
    pub rhs: AstNodeId,
    pub body: AstNodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafPattern {
    NameDef(AstNodeId),
    NameRef(AstNodeId),
    Number(AstNodeId),
    ColonRef(AstNodeId),
    Wildcard(AstNodeId),
}

impl LeafPattern {
    pub fn node(&self) -> AstNodeId {
        match self {
            LeafPattern::NameDef(id)
            | LeafPattern::NameRef(id)
            | LeafPattern::Number(id)
            | LeafPattern::ColonRef(id)
            | LeafPattern::Wildcard(id) => *id,
        }
    }
}

/// Pattern tree used by `let` destructuring, `match` arms, and loop
/// bindings. Interior nodes destructure tuples; children are further
/// `NameDefTree` nodes.
#[derive(Debug, Clone)]
pub enum NameDefTree {
    Leaf(LeafPattern),
    Interior(Vec<AstNodeId>),
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    /// `NameDefTree` nodes; several patterns in one arm share the arm body.
    pub patterns: Vec<AstNodeId>,
    pub expr: AstNodeId,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Match {
    pub matched: AstNodeId,
    pub arms: Vec<MatchArm>,
}

/// `for (i, carry) in iterable { body }(init)`
#[derive(Debug, Clone)]
pub struct For {
    /// A `NameDefTree` node binding the induction variable and loop carry.
    pub names: AstNodeId,
    pub iterable: AstNodeId,
    pub body: AstNodeId,
    pub init: AstNodeId,
}

/// Reference to a nominal type declared in some module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDefinition {
    /// Index into `Module::type_defs`.
    TypeDef(usize),
    /// Index into `Module::struct_defs`.
    Struct(usize),
    /// Index into `Module::enum_defs`.
    Enum(usize),
    /// Imported nominal type (`ColonRef` node).
    ColonRef(AstNodeId),
}

#[derive(Debug, Clone)]
pub struct StructInstance {
    pub struct_ref: TypeDefinition,
    /// Members as written; lowering reorders them to declaration order.
    pub members: Vec<(String, AstNodeId)>,
}

#[derive(Debug, Clone)]
pub struct SplatStructInstance {
    pub struct_ref: TypeDefinition,
    pub members: Vec<(String, AstNodeId)>,
    pub splatted: AstNodeId,
}

#[derive(Debug, Clone)]
pub enum AstNodeKind {
    Number(Number),
    NameDef(NameDef),
    NameRef(NameRef),
    ColonRef(ColonRef),
    Wildcard,
    Unop(Unop),
    Binop(Binop),
    Ternary(Ternary),
    Cast(Cast),
    Tuple(TupleExpr),
    Array(ArrayExpr),
    ConstantArray(ArrayExpr),
    Slice(Slice),
    WidthSlice(WidthSlice),
    Index(IndexExpr),
    Attr(Attr),
    Invocation(Invocation),
    Let(Let),
    NameDefTree(NameDefTree),
    Match(Match),
    For(For),
    StructInstance(StructInstance),
    SplatStructInstance(SplatStructInstance),
}

impl AstNodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            AstNodeKind::Number(_) => "number",
            AstNodeKind::NameDef(_) => "name-def",
            AstNodeKind::NameRef(_) => "name-ref",
            AstNodeKind::ColonRef(_) => "colon-ref",
            AstNodeKind::Wildcard => "wildcard",
            AstNodeKind::Unop(_) => "unop",
            AstNodeKind::Binop(_) => "binop",
            AstNodeKind::Ternary(_) => "ternary",
            AstNodeKind::Cast(_) => "cast",
            AstNodeKind::Tuple(_) => "tuple",
            AstNodeKind::Array(_) => "array",
            AstNodeKind::ConstantArray(_) => "constant-array",
            AstNodeKind::Slice(_) => "slice",
            AstNodeKind::WidthSlice(_) => "width-slice",
            AstNodeKind::Index(_) => "index",
            AstNodeKind::Attr(_) => "attr",
            AstNodeKind::Invocation(_) => "invocation",
            AstNodeKind::Let(_) => "let",
            AstNodeKind::NameDefTree(_) => "name-def-tree",
            AstNodeKind::Match(_) => "match",
            AstNodeKind::For(_) => "for",
            AstNodeKind::StructInstance(_) => "struct-instance",
            AstNodeKind::SplatStructInstance(_) => "splat-struct-instance",
        }
    }

    /// Direct AST children, used by subtree walks (free-variable analysis).
    pub fn children(&self) -> Vec<AstNodeId> {
        match self {
            AstNodeKind::Number(_) | AstNodeKind::NameDef(_) | AstNodeKind::Wildcard => Vec::new(),
            AstNodeKind::NameRef(_) => Vec::new(),
            AstNodeKind::ColonRef(c) => vec![c.subject],
            AstNodeKind::Unop(u) => vec![u.operand],
            AstNodeKind::Binop(b) => vec![b.lhs, b.rhs],
            AstNodeKind::Ternary(t) => vec![t.test, t.consequent, t.alternate],
            AstNodeKind::Cast(c) => vec![c.expr],
            AstNodeKind::Tuple(t) => t.members.clone(),
            AstNodeKind::Array(a) | AstNodeKind::ConstantArray(a) => a.members.clone(),
            AstNodeKind::Slice(s) => s.start.into_iter().chain(s.limit).collect(),
            AstNodeKind::WidthSlice(w) => vec![w.start],
            AstNodeKind::Index(i) => {
                let rhs = match i.rhs {
                    IndexRhs::Value(id) | IndexRhs::Slice(id) | IndexRhs::Width(id) => id,
                };
                vec![i.lhs, rhs]
            }
            AstNodeKind::Attr(a) => vec![a.lhs],
            AstNodeKind::Invocation(i) => {
                let mut out = vec![i.callee];
                out.extend(&i.args);
                out
            }
            AstNodeKind::Let(l) => vec![l.name_def_tree, l.rhs, l.body],
            AstNodeKind::NameDefTree(NameDefTree::Leaf(leaf)) => vec![leaf.node()],
            AstNodeKind::NameDefTree(NameDefTree::Interior(children)) => children.clone(),
            AstNodeKind::Match(m) => {
                let mut out = vec![m.matched];
                for arm in &m.arms {
                    out.extend(&arm.patterns);
                    out.push(arm.expr);
                }
                out
            }
            AstNodeKind::For(f) => vec![f.names, f.iterable, f.body, f.init],
            AstNodeKind::StructInstance(s) => s.members.iter().map(|(_, e)| *e).collect(),
            AstNodeKind::SplatStructInstance(s) => {
                let mut out = vec![s.splatted];
                out.extend(s.members.iter().map(|(_, e)| *e));
                out
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AstNode {
    pub id: AstNodeId,
    pub span: Span,
    pub kind: AstNodeKind,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name_def: AstNodeId,
}

#[derive(Debug, Clone, Copy)]
pub struct ParametricBinding {
    pub name_def: AstNodeId,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name_def: AstNodeId,
    pub params: Vec<Param>,
    pub parametric_bindings: Vec<ParametricBinding>,
    pub body: AstNodeId,
    pub span: Span,
}

impl Function {
    pub fn is_parametric(&self) -> bool {
        !self.parametric_bindings.is_empty()
    }

    /// Names of the parametric bindings that must be supplied to instantiate
    /// this function.
    pub fn free_parametric_keys(&self, module: &Module) -> std::collections::BTreeSet<String> {
        self.parametric_bindings
            .iter()
            .filter_map(|pb| module.identifier_of(pb.name_def))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantDef {
    pub name_def: AstNodeId,
    pub value: AstNodeId,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name_def: AstNodeId,
    /// Member names in declaration order; member types live in the type table.
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name_def: AstNodeId,
    pub values: Vec<(String, AstNodeId)>,
}

impl EnumDef {
    pub fn get_value(&self, name: &str) -> Option<AstNodeId> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name_def: AstNodeId,
    pub target: TypeDefinition,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub name_def: AstNodeId,
    /// Dotted path of the imported module (e.g. `lib.bits`).
    pub subject: String,
}

/// A type-checked module: an arena of AST nodes plus its top-level members.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    /// Filesystem path the module was parsed from; recorded in the package's
    /// file table for source locations.
    pub fs_path: String,
    nodes: Vec<AstNode>,
    pub functions: Vec<Function>,
    pub constant_defs: Vec<ConstantDef>,
    pub struct_defs: Vec<StructDef>,
    pub enum_defs: Vec<EnumDef>,
    pub type_defs: Vec<TypeDef>,
    pub imports: Vec<Import>,
}

impl Module {
    pub fn new(id: ModuleId, name: impl Into<String>, fs_path: impl Into<String>) -> Self {
        Module {
            id,
            name: name.into(),
            fs_path: fs_path.into(),
            nodes: Vec::new(),
            functions: Vec::new(),
            constant_defs: Vec::new(),
            struct_defs: Vec::new(),
            enum_defs: Vec::new(),
            type_defs: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn add_node(&mut self, span: Span, kind: AstNodeKind) -> AstNodeId {
        let id = AstNodeId {
            module: self.id,
            index: self.nodes.len() as u32,
        };
        self.nodes.push(AstNode { id, span, kind });
        id
    }

    pub fn node(&self, id: AstNodeId) -> Option<&AstNode> {
        if id.module != self.id {
            return None;
        }
        self.nodes.get(id.index as usize)
    }

    pub fn span_of(&self, id: AstNodeId) -> Option<Span> {
        self.node(id).map(|n| n.span)
    }

    /// Identifier of a `NameDef` node.
    pub fn identifier_of(&self, id: AstNodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            AstNodeKind::NameDef(def) => Some(&def.identifier),
            _ => None,
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| self.identifier_of(f.name_def) == Some(name))
    }

    pub fn get_constant_def(&self, name: &str) -> Option<&ConstantDef> {
        self.constant_defs
            .iter()
            .find(|c| self.identifier_of(c.name_def) == Some(name))
    }

    pub fn constant_def_for_name_def(&self, name_def: AstNodeId) -> Option<&ConstantDef> {
        self.constant_defs.iter().find(|c| c.name_def == name_def)
    }

    pub fn function_for_name_def(&self, name_def: AstNodeId) -> Option<&Function> {
        self.functions.iter().find(|f| f.name_def == name_def)
    }

    pub fn import_for_name_def(&self, name_def: AstNodeId) -> Option<&Import> {
        self.imports.iter().find(|i| i.name_def == name_def)
    }

    /// Whether the given name definition names a type-level entity (struct,
    /// enum, or type alias).
    pub fn is_type_definition_name(&self, name_def: AstNodeId) -> bool {
        self.struct_defs.iter().any(|s| s.name_def == name_def)
            || self.enum_defs.iter().any(|e| e.name_def == name_def)
            || self.type_defs.iter().any(|t| t.name_def == name_def)
    }

    /// Looks up a nominal type declared in this module by name.
    pub fn get_type_definition(&self, name: &str) -> Option<TypeDefinition> {
        if let Some(i) = self
            .struct_defs
            .iter()
            .position(|s| self.identifier_of(s.name_def) == Some(name))
        {
            return Some(TypeDefinition::Struct(i));
        }
        if let Some(i) = self
            .enum_defs
            .iter()
            .position(|e| self.identifier_of(e.name_def) == Some(name))
        {
            return Some(TypeDefinition::Enum(i));
        }
        if let Some(i) = self
            .type_defs
            .iter()
            .position(|t| self.identifier_of(t.name_def) == Some(name))
        {
            return Some(TypeDefinition::TypeDef(i));
        }
        None
    }

    /// The `NameDefTree` stored at `id`, if that node is a pattern tree.
    pub fn name_def_tree(&self, id: AstNodeId) -> Option<&NameDefTree> {
        match &self.node(id)?.kind {
            AstNodeKind::NameDefTree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Whether the pattern tree at `id` matches every value of its type:
    /// a wildcard, a plain name, or a tuple of irrefutable patterns.
    pub fn pattern_is_irrefutable(&self, id: AstNodeId) -> bool {
        match self.name_def_tree(id) {
            Some(NameDefTree::Leaf(LeafPattern::Wildcard(_)))
            | Some(NameDefTree::Leaf(LeafPattern::NameDef(_))) => true,
            Some(NameDefTree::Leaf(_)) => false,
            Some(NameDefTree::Interior(children)) => children
                .iter()
                .all(|child| self.pattern_is_irrefutable(*child)),
            None => false,
        }
    }

    /// Identifiers of all module-level constants.
    pub fn constant_identifiers(&self) -> HashSet<String> {
        self.constant_defs
            .iter()
            .filter_map(|c| self.identifier_of(c.name_def))
            .map(str::to_string)
            .collect()
    }
}

/// All `NameDef` nodes inside the subtree at `root`.
pub fn name_defs_within(module: &Module, root: AstNodeId) -> HashSet<AstNodeId> {
    let mut stack = vec![root];
    let mut defs = HashSet::new();
    while let Some(id) = stack.pop() {
        let Some(node) = module.node(id) else {
            continue;
        };
        if matches!(node.kind, AstNodeKind::NameDef(_)) {
            defs.insert(id);
        } else {
            stack.extend(node.kind.children());
        }
    }
    defs
}

/// Name definitions referenced from the subtree at `root` but defined
/// outside it, in first-reference order.
pub fn free_name_defs(module: &Module, root: AstNodeId) -> Vec<AstNodeId> {
    let mut stack = vec![root];
    let mut defined = HashSet::new();
    let mut referenced = Vec::new();
    while let Some(id) = stack.pop() {
        let Some(node) = module.node(id) else {
            continue;
        };
        match &node.kind {
            AstNodeKind::NameDef(_) => {
                defined.insert(id);
            }
            AstNodeKind::NameRef(name_ref) => {
                referenced.push(name_ref.name_def);
            }
            kind => {
                // Reverse keeps the walk in source order despite the stack.
                let mut children = kind.children();
                children.reverse();
                stack.extend(children);
            }
        }
    }

    let mut seen = HashSet::new();
    referenced
        .into_iter()
        .filter(|def| !defined.contains(def) && seen.insert(*def))
        .collect()
}
