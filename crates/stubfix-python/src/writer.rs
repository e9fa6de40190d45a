//! Stub writer: interface model back to `.pyi` text.
//!
//! Declarations that still carry their original source are emitted byte for
//! byte; touched declarations are regenerated in canonical form with the
//! module's line ending.

use crate::model::{
    Attribute, Body, Class, Decorator, Import, ImportDecl, Member, Meta, Method, Module, Signal,
    Verbatim,
};

/// Writer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// One level of indentation for regenerated declarations.
    pub indent: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            indent: "    ".to_string(),
        }
    }
}

/// Render a module.
pub fn write_module(module: &Module, options: &WriterOptions) -> String {
    let mut writer = Writer {
        out: String::new(),
        newline: module.line_ending.as_str(),
        indent: &options.indent,
    };
    for member in &module.body {
        writer.member(member, 0);
    }
    for line in &module.trailing {
        writer.raw(line);
    }
    writer.out
}

/// Render one member at the given depth, without leading trivia.
pub fn write_member(member: &Member, depth: usize, options: &WriterOptions) -> String {
    let mut writer = Writer {
        out: String::new(),
        newline: "\n",
        indent: &options.indent,
    };
    let mut member = member.clone();
    member.clear_sources();
    member.meta_mut().leading.clear();
    writer.member(&member, depth);
    writer.out
}

struct Writer<'o> {
    out: String,
    newline: &'static str,
    indent: &'o str,
}

fn with_comment(text: String, comment: &Option<String>) -> String {
    match comment {
        Some(comment) => format!("{}  {}", text, comment),
        None => text,
    }
}

impl Writer<'_> {
    /// Append raw text, first terminating a previous line that lacked one.
    fn raw(&mut self, text: &str) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push_str(self.newline);
        }
        self.out.push_str(text);
    }

    fn line(&mut self, depth: usize, text: &str) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push_str(self.newline);
        }
        if !text.is_empty() {
            for _ in 0..depth {
                self.out.push_str(self.indent);
            }
        }
        if self.newline == "\n" {
            self.out.push_str(text);
        } else {
            self.out.push_str(&text.replace('\n', self.newline));
        }
        self.out.push_str(self.newline);
    }

    /// Emit leading trivia, then the original source if there is one.
    /// Returns true when the declaration still needs regenerating.
    fn prelude(&mut self, meta: &Meta) -> bool {
        for line in &meta.leading {
            self.raw(line);
        }
        match &meta.source {
            Some(source) => {
                self.raw(source);
                false
            }
            None => true,
        }
    }

    fn member(&mut self, member: &Member, depth: usize) {
        match member {
            Member::Overloads(group) => {
                for method in &group.methods {
                    self.method(method, depth);
                }
            }
            Member::Class(class) => self.class(class, depth),
            Member::Method(method) => self.method(method, depth),
            Member::Import(import) => self.import(import, depth),
            Member::Attribute(attribute) => self.attribute(attribute, depth),
            Member::Signal(signal) => self.signal(signal, depth),
            Member::Verbatim(verbatim) => self.verbatim(verbatim, depth),
        }
    }

    fn decorators(&mut self, decorators: &[Decorator], depth: usize) {
        for decorator in decorators {
            let text = with_comment(format!("@{}", decorator.expr), &decorator.comment);
            self.line(depth, &text);
        }
    }

    fn method(&mut self, method: &Method, depth: usize) {
        if !self.prelude(&method.meta) {
            return;
        }
        self.decorators(&method.decorators, depth);
        let header = format!(
            "{}def {}{}:",
            if method.is_async { "async " } else { "" },
            method.name,
            method.signature
        );
        match &method.body {
            Body::Inline(body) => {
                let text = with_comment(format!("{} {}", header, body), &method.meta.comment);
                self.line(depth, &text);
            }
            Body::Block(lines) => {
                self.line(depth, &with_comment(header, &method.meta.comment));
                for line in lines {
                    self.line(depth + 1, line);
                }
            }
        }
    }

    fn class(&mut self, class: &Class, depth: usize) {
        if self.prelude(&class.meta) {
            self.decorators(&class.decorators, depth);
            let mut header = format!("class {}", class.name);
            if !class.bases.is_empty() {
                header.push('(');
                header.push_str(&class.bases.join(", "));
                header.push(')');
            }
            header.push(':');
            if class.body.is_empty() {
                header.push(' ');
                header.push_str(class.inline_body.as_deref().unwrap_or("..."));
            }
            self.line(depth, &with_comment(header, &class.meta.comment));
        }
        for member in &class.body {
            self.member(member, depth + 1);
        }
    }

    fn import(&mut self, decl: &ImportDecl, depth: usize) {
        if !self.prelude(&decl.meta) {
            return;
        }
        let join = |names: &[crate::model::ImportName]| {
            names
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let text = match &decl.import {
            Import::Plain(names) => format!("import {}", join(names)),
            Import::From { module, names } => format!("from {} import {}", module, join(names)),
        };
        self.line(depth, &with_comment(text, &decl.meta.comment));
    }

    fn attribute(&mut self, attribute: &Attribute, depth: usize) {
        if !self.prelude(&attribute.meta) {
            return;
        }
        let mut text = attribute.name.clone();
        if let Some(annotation) = &attribute.annotation {
            text.push_str(": ");
            text.push_str(annotation);
        }
        if let Some(value) = &attribute.value {
            text.push_str(" = ");
            text.push_str(value);
        }
        self.line(depth, &with_comment(text, &attribute.meta.comment));
    }

    fn verbatim(&mut self, verbatim: &Verbatim, depth: usize) {
        if !self.prelude(&verbatim.meta) {
            return;
        }
        for line in &verbatim.lines {
            self.line(depth, line);
        }
    }

    /// Signals regenerate as one decorated `def` per variant.
    fn signal(&mut self, signal: &Signal, depth: usize) {
        if !self.prelude(&signal.meta) {
            return;
        }
        let overloaded = signal.variants.len() > 1;
        let mut comment = signal.meta.comment.clone();
        for variant in &signal.variants {
            if overloaded {
                self.line(depth, &with_comment("@typing.overload".to_string(), &comment));
                comment = None;
            }
            self.line(depth, &with_comment(format!("@{}", signal.marker), &comment));
            comment = None;

            // Module-level signals have no receiver.
            let mut params: Vec<String> = if depth > 0 {
                vec!["self".to_string()]
            } else {
                Vec::new()
            };
            params.extend(variant.types.iter().enumerate().map(|(i, ty)| match ty {
                Some(ty) => format!("a{}: {}", i, ty),
                None => format!("a{}", i),
            }));
            let returns = signal
                .returns
                .as_ref()
                .map(|r| format!(" -> {}", r))
                .unwrap_or_default();
            self.line(
                depth,
                &format!("def {}({}){}: ...", signal.name, params.join(", "), returns),
            );
        }
    }
}
