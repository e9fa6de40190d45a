//! Interface model for a parsed `.pyi` module.
//!
//! Every declaration carries a [`Meta`] with the trivia that precedes it, its
//! trailing comment, and the exact source text it was parsed from. The
//! writer emits that source verbatim while it is present; dropping it (see
//! [`Meta::touch`]) marks the declaration as regenerated.

use std::collections::BTreeSet;
use std::fmt;

use stubfix_core::text::LineEnding;

/// Trivia and provenance attached to one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Meta {
    /// Blank and comment lines before the declaration, terminators included.
    pub leading: Vec<String>,
    /// Trailing `#` comment of the declaration line.
    pub comment: Option<String>,
    /// Exact original text, `None` once the declaration has been modified.
    pub source: Option<String>,
}

impl Meta {
    /// Mark the declaration as regenerated.
    pub fn touch(&mut self) {
        self.source = None;
    }

    pub fn is_touched(&self) -> bool {
        self.source.is_none()
    }
}

/// A parsed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub body: Vec<Member>,
    /// Trivia after the last declaration.
    pub trailing: Vec<String>,
    pub line_ending: LineEnding,
}

impl Module {
    /// Copy with every source, comment and leading line removed, for
    /// structural comparison.
    pub fn shape(&self) -> Module {
        Module {
            name: self.name.clone(),
            body: self.body.iter().map(Member::shape).collect(),
            trailing: Vec::new(),
            line_ending: LineEnding::Lf,
        }
    }

    /// Copy with only the original sources dropped.
    pub fn without_sources(&self) -> Module {
        let mut module = self.clone();
        for member in &mut module.body {
            member.clear_sources();
        }
        module
    }

    /// Find a top-level member by name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.body.iter().find(|m| m.name() == Some(name))
    }

    /// Find a class by dotted path (`Outer.Inner`).
    pub fn class(&self, path: &str) -> Option<&Class> {
        let mut members = &self.body;
        let mut found = None;
        for part in path.split('.') {
            let class = members.iter().find_map(|m| match m {
                Member::Class(c) if c.name == part => Some(c),
                _ => None,
            })?;
            members = &class.body;
            found = Some(class);
        }
        found
    }
}

// ============================================================================
// Members
// ============================================================================

/// One declaration inside a module or class body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Import(ImportDecl),
    Attribute(Attribute),
    Method(Method),
    Overloads(OverloadGroup),
    Signal(Signal),
    Class(Class),
    /// Any other statement, kept as dedented raw lines.
    Verbatim(Verbatim),
}

impl Member {
    /// Declared name; imports and verbatim statements have none.
    pub fn name(&self) -> Option<&str> {
        match self {
            Member::Attribute(a) => Some(&a.name),
            Member::Method(m) => Some(&m.name),
            Member::Overloads(g) => Some(&g.name),
            Member::Signal(s) => Some(&s.name),
            Member::Class(c) => Some(&c.name),
            Member::Import(_) | Member::Verbatim(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Member::Import(_) => "import",
            Member::Attribute(_) => "attribute",
            Member::Method(_) => "method",
            Member::Overloads(_) => "overload group",
            Member::Signal(_) => "signal",
            Member::Class(_) => "class",
            Member::Verbatim(_) => "statement",
        }
    }

    /// Metadata of the first line of the declaration.
    pub fn meta(&self) -> &Meta {
        match self {
            Member::Import(i) => &i.meta,
            Member::Attribute(a) => &a.meta,
            Member::Method(m) => &m.meta,
            Member::Overloads(g) => &g.first().meta,
            Member::Signal(s) => &s.meta,
            Member::Class(c) => &c.meta,
            Member::Verbatim(v) => &v.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Member::Import(i) => &mut i.meta,
            Member::Attribute(a) => &mut a.meta,
            Member::Method(m) => &mut m.meta,
            Member::Overloads(g) => &mut g.first_mut().meta,
            Member::Signal(s) => &mut s.meta,
            Member::Class(c) => &mut c.meta,
            Member::Verbatim(v) => &mut v.meta,
        }
    }

    /// Structural copy without trivia or sources.
    pub fn shape(&self) -> Member {
        let mut member = self.clone();
        member.strip(true);
        member
    }

    /// Whether two members are the same declaration up to trivia.
    pub fn same_shape(&self, other: &Member) -> bool {
        self.shape() == other.shape()
    }

    pub(crate) fn clear_sources(&mut self) {
        self.strip(false);
    }

    fn strip(&mut self, trivia: bool) {
        fn clear(meta: &mut Meta, trivia: bool) {
            meta.source = None;
            if trivia {
                meta.leading.clear();
                meta.comment = None;
            }
        }
        match self {
            Member::Import(i) => clear(&mut i.meta, trivia),
            Member::Attribute(a) => clear(&mut a.meta, trivia),
            Member::Method(m) => m.strip(trivia),
            Member::Overloads(g) => {
                for m in &mut g.methods {
                    m.strip(trivia);
                }
            }
            Member::Signal(s) => clear(&mut s.meta, trivia),
            Member::Class(c) => {
                clear(&mut c.meta, trivia);
                if trivia {
                    for d in &mut c.decorators {
                        d.comment = None;
                    }
                }
                for m in &mut c.body {
                    m.strip(trivia);
                }
            }
            Member::Verbatim(v) => clear(&mut v.meta, trivia),
        }
    }
}

// ============================================================================
// Imports
// ============================================================================

/// `name [as alias]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl fmt::Display for ImportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} as {}", self.name, alias),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Import {
    /// `import a.b [as c], d`
    Plain(Vec<ImportName>),
    /// `from module import x [as y], ...`
    From {
        module: String,
        names: Vec<ImportName>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub import: Import,
    pub meta: Meta,
}

// ============================================================================
// Attributes and verbatim statements
// ============================================================================

/// `name[: annotation][ = value]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub annotation: Option<String>,
    pub value: Option<String>,
    pub meta: Meta,
}

/// A statement the model does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verbatim {
    /// Physical lines with the statement's own indentation removed.
    pub lines: Vec<String>,
    pub meta: Meta,
}

// ============================================================================
// Functions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Regular,
    /// `*args`
    VarPositional,
    /// `**kwargs`
    VarKeyword,
    /// bare `*`
    KeywordOnlyMarker,
    /// `/`
    PositionalOnlyMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<String>,
    pub default: Option<String>,
}

impl Param {
    pub fn regular(name: impl Into<String>, annotation: Option<&str>) -> Self {
        Param {
            name: name.into(),
            kind: ParamKind::Regular,
            annotation: annotation.map(str::to_string),
            default: None,
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(
            self.kind,
            ParamKind::KeywordOnlyMarker | ParamKind::PositionalOnlyMarker
        )
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::KeywordOnlyMarker => return f.write_str("*"),
            ParamKind::PositionalOnlyMarker => return f.write_str("/"),
            ParamKind::VarPositional => f.write_str("*")?,
            ParamKind::VarKeyword => f.write_str("**")?,
            ParamKind::Regular => {}
        }
        f.write_str(&self.name)?;
        if let Some(annotation) = &self.annotation {
            write!(f, ": {}", annotation)?;
        }
        match (&self.default, &self.annotation) {
            (Some(default), Some(_)) => write!(f, " = {}", default),
            (Some(default), None) => write!(f, "={}", default),
            (None, _) => Ok(()),
        }
    }
}

/// Parameter list plus return annotation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: Option<String>,
}

impl Signature {
    /// Number of real parameters (markers excluded).
    pub fn arity(&self) -> usize {
        self.params.iter().filter(|p| !p.is_marker()).count()
    }

    /// Equality after type-text normalisation.
    pub fn same_shape(&self, other: &Signature) -> bool {
        fn norm(text: &Option<String>) -> Option<String> {
            text.as_deref().map(normalize_type)
        }
        self.params.len() == other.params.len()
            && self.params.iter().zip(&other.params).all(|(a, b)| {
                a.name == b.name
                    && a.kind == b.kind
                    && norm(&a.annotation) == norm(&b.annotation)
                    && norm(&a.default) == norm(&b.default)
            })
            && norm(&self.returns) == norm(&other.returns)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")?;
        if let Some(returns) = &self.returns {
            write!(f, " -> {}", returns)?;
        }
        Ok(())
    }
}

/// Stub body of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Body on the header line: `def f(): ...`
    Inline(String),
    /// Indented lines, dedented, comments kept inline.
    Block(Vec<String>),
}

impl Default for Body {
    fn default() -> Self {
        Body::Inline("...".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    /// Expression after `@`.
    pub expr: String,
    pub comment: Option<String>,
}

impl Decorator {
    pub fn new(expr: impl Into<String>) -> Self {
        Decorator {
            expr: expr.into(),
            comment: None,
        }
    }

    /// Callee name without call arguments (`pyqtSignal` for `pyqtSignal(int)`).
    pub fn name(&self) -> &str {
        match self.expr.find('(') {
            Some(i) => self.expr[..i].trim_end(),
            None => &self.expr,
        }
    }

    /// Text between the call parentheses, if the decorator is a call.
    pub fn arguments(&self) -> Option<&str> {
        let open = self.expr.find('(')?;
        let inner = self.expr[open + 1..].trim_end().strip_suffix(')')?;
        Some(inner)
    }

    pub fn is_overload(&self) -> bool {
        matches!(
            self.name(),
            "overload" | "typing.overload" | "typing_extensions.overload"
        )
    }
}

/// Behavioural markers derived from decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    Static,
    Class,
    Overload,
    Abstract,
    Property,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub is_async: bool,
    pub signature: Signature,
    pub body: Body,
    pub meta: Meta,
}

impl Method {
    pub fn modifiers(&self) -> BTreeSet<Modifier> {
        self.decorators
            .iter()
            .filter_map(|d| {
                let name = d.name();
                let last = name.rsplit('.').next().unwrap_or(name);
                match last {
                    "staticmethod" => Some(Modifier::Static),
                    "classmethod" => Some(Modifier::Class),
                    "overload" => Some(Modifier::Overload),
                    "abstractmethod" => Some(Modifier::Abstract),
                    "property" | "setter" | "getter" | "deleter" => Some(Modifier::Property),
                    _ => None,
                }
            })
            .collect()
    }

    /// The comment a type checker attributes to this declaration: the first
    /// decorator line if there is one, the `def` line otherwise.
    pub fn header_comment_mut(&mut self) -> &mut Option<String> {
        match self.decorators.first_mut() {
            Some(decorator) => &mut decorator.comment,
            None => &mut self.meta.comment,
        }
    }

    fn strip(&mut self, trivia: bool) {
        self.meta.source = None;
        if trivia {
            self.meta.leading.clear();
            self.meta.comment = None;
            for d in &mut self.decorators {
                d.comment = None;
            }
        }
    }
}

/// Adjacent same-named methods; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadGroup {
    pub name: String,
    pub methods: Vec<Method>,
}

impl OverloadGroup {
    pub fn first(&self) -> &Method {
        &self.methods[0]
    }

    pub fn first_mut(&mut self) -> &mut Method {
        &mut self.methods[0]
    }
}

// ============================================================================
// Signals
// ============================================================================

/// One call shape of a signal; parameter names are not structural.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalVariant {
    pub types: Vec<Option<String>>,
}

impl SignalVariant {
    pub fn new<S: AsRef<str>>(types: &[S]) -> Self {
        SignalVariant {
            types: types.iter().map(|t| Some(t.as_ref().to_string())).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub variants: Vec<SignalVariant>,
    pub returns: Option<String>,
    /// Marker used when regenerating (`pyqtSignal`, `QtCore.pyqtSignal`, ...).
    pub marker: String,
    pub meta: Meta,
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub name: String,
    pub bases: Vec<String>,
    pub decorators: Vec<Decorator>,
    pub body: Vec<Member>,
    /// `...`/`pass` written on the header line when the body is empty.
    pub inline_body: Option<String>,
    /// Source covers the decorators and the header line only.
    pub meta: Meta,
}

impl Class {
    pub fn header_comment_mut(&mut self) -> &mut Option<String> {
        match self.decorators.first_mut() {
            Some(decorator) => &mut decorator.comment,
            None => &mut self.meta.comment,
        }
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.body.iter().find(|m| m.name() == Some(name))
    }
}

// ============================================================================
// Type text
// ============================================================================

/// Canonical form of a type or default expression used for comparisons:
/// whitespace outside string literals removed, quotes unified, and a fully
/// quoted forward reference unwrapped.
pub fn normalize_type(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    for c in text.trim().chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    out.push('"');
                } else if !c.is_whitespace() {
                    out.push(c);
                }
            }
        }
    }
    if out.len() >= 2 && out.starts_with('"') && out.ends_with('"') && !out[1..out.len() - 1].contains('"') {
        out = out[1..out.len() - 1].to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_type_ignores_spacing_and_quotes() {
        assert_eq!(normalize_type("typing.Optional[ str ]"), "typing.Optional[str]");
        assert_eq!(normalize_type("'QObject'"), "QObject");
        assert_eq!(
            normalize_type("typing.Literal['a b']"),
            "typing.Literal[\"a b\"]"
        );
        assert_eq!(normalize_type("Dict[str,int]"), normalize_type("Dict[str, int]"));
    }

    #[test]
    fn param_display() {
        let mut p = Param::regular("size", Some("int"));
        p.default = Some("-1".to_string());
        assert_eq!(p.to_string(), "size: int = -1");
        let q = Param {
            name: "x".to_string(),
            kind: ParamKind::Regular,
            annotation: None,
            default: Some("0".to_string()),
        };
        assert_eq!(q.to_string(), "x=0");
        let star = Param {
            name: "args".to_string(),
            kind: ParamKind::VarPositional,
            annotation: Some("typing.Any".to_string()),
            default: None,
        };
        assert_eq!(star.to_string(), "*args: typing.Any");
    }

    #[test]
    fn arity_skips_markers() {
        let sig = Signature {
            params: vec![
                Param::regular("self", None),
                Param {
                    name: String::new(),
                    kind: ParamKind::KeywordOnlyMarker,
                    annotation: None,
                    default: None,
                },
                Param::regular("name", Some("str")),
            ],
            returns: None,
        };
        assert_eq!(sig.arity(), 2);
        assert_eq!(sig.to_string(), "(self, *, name: str)");
    }

    #[test]
    fn modifiers_from_decorators() {
        let method = Method {
            name: "f".to_string(),
            decorators: vec![
                Decorator::new("typing.overload"),
                Decorator::new("staticmethod"),
            ],
            is_async: false,
            signature: Signature::default(),
            body: Body::default(),
            meta: Meta::default(),
        };
        let mods = method.modifiers();
        assert!(mods.contains(&Modifier::Overload));
        assert!(mods.contains(&Modifier::Static));
        assert!(!mods.contains(&Modifier::Property));
    }

    #[test]
    fn overload_group_meta_is_first_overload() {
        let method = |comment: &str| Method {
            name: "f".to_string(),
            decorators: vec![Decorator::new("typing.overload")],
            is_async: false,
            signature: Signature::default(),
            body: Body::default(),
            meta: Meta {
                leading: Vec::new(),
                comment: Some(comment.to_string()),
                source: Some("def f(): ...\n".to_string()),
            },
        };
        let mut member = Member::Overloads(OverloadGroup {
            name: "f".to_string(),
            methods: vec![method("# first"), method("# second")],
        });
        assert_eq!(member.meta().comment.as_deref(), Some("# first"));

        member.meta_mut().touch();
        let Member::Overloads(group) = &member else {
            panic!("expected overloads");
        };
        assert!(group.methods[0].meta.is_touched());
        assert!(!group.methods[1].meta.is_touched());
    }

    #[test]
    fn decorator_call_parts() {
        let d = Decorator::new("pyqtSignal(int, str)");
        assert_eq!(d.name(), "pyqtSignal");
        assert_eq!(d.arguments(), Some("int, str"));
        assert_eq!(Decorator::new("staticmethod").arguments(), None);
    }
}
