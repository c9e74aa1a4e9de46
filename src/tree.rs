/// Concrete parse tree for the Puppy source language.
///
/// The transpiler dispatches on `Tag`, a closed enum, so an unhandled
/// construct is a compile-time hole rather than a runtime lookup miss.
/// Nodes carry their source span (char offset, 1-based row, column, length)
/// and the raw source text of the token they cover, which diagnostics and
/// the runtime token map both rely on.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    // Statements
    Source,
    Block,
    If,
    While,
    For,
    FuncDecl,
    Return,
    Break,
    Continue,
    Pass,
    Import,
    Assign,
    SelfAssign,
    ExprStmt,
    /// Recovery marker inserted where a statement failed to parse.
    Err,
    // Expressions
    Or,
    And,
    Not,
    Infix,
    Unary,
    IfExpr,
    ApplyExpr,
    MethodExpr,
    GetField,
    IndexExpr,
    Slice,
    ListExpr,
    TupleExpr,
    DataExpr,
    KeyValue,
    Param,
    Name,
    Num,
    Str,
    FormatStr,
    FormatSeg,
    TrueLit,
    FalseLit,
    NullLit,
}

#[derive(Debug, Clone)]
pub struct ParseTree {
    pub tag: Tag,
    pub pos: usize,
    pub row: usize,
    pub col: usize,
    pub len: usize,
    token: String,
    subs: Vec<ParseTree>,
    slots: Vec<(&'static str, usize)>,
}

impl ParseTree {
    pub fn new(tag: Tag, pos: usize, row: usize, col: usize, len: usize) -> Self {
        ParseTree {
            tag,
            pos,
            row,
            col,
            len,
            token: String::new(),
            subs: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Append an anonymous child (ordered, e.g. list elements or statements).
    pub fn push(&mut self, sub: ParseTree) {
        self.subs.push(sub);
    }

    /// Append a named child for grammar productions with named slots.
    pub fn set(&mut self, name: &'static str, sub: ParseTree) {
        self.slots.push((name, self.subs.len()));
        self.subs.push(sub);
    }

    pub fn get(&self, name: &str) -> Option<&ParseTree> {
        self.slots
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, i)| &self.subs[*i])
    }

    pub fn subs(&self) -> &[ParseTree] {
        &self.subs
    }

    /// Raw source text of the token this node covers ("" for pure composites).
    pub fn tokenize(&self) -> &str {
        &self.token
    }

    pub fn begin(&self) -> (usize, usize, usize) {
        (self.pos, self.row, self.col)
    }

    pub fn length(&self) -> usize {
        self.len
    }
}
