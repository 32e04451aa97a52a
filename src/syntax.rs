//! Annotation syntax as seen by the resolver.
//!
//! The front end hands us annotations either pre-parsed or as text such as
//! `Dict[str, List[Optional['Node']]]`. This is syntax only: nothing here knows
//! whether `Node` exists.
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::schema::Scalar;
use crate::schema::canonical::write_list;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeExpr {
    /// `int`, `Any`, `Point`, or a quoted forward reference `'Point'`.
    Name(String),
    /// `List[int]`, `Dict[str, V]`, `Union[A, B]`, ...
    Generic { base: String, args: Vec<TypeExpr> },
    /// `Literal["a", 1, true]`
    Literal(Vec<Scalar>),
    /// `A | B`
    Or(Box<TypeExpr>, Box<TypeExpr>),
    /// `None`, only meaningful as a union member.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse annotation `{text}` at offset {offset}: {reason}")]
pub struct SyntaxError {
    pub text: String,
    pub offset: usize,
    pub reason: String,
}

impl TypeExpr {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn generic(base: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        Self::Generic { base: base.into(), args }
    }

    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        let mut p = Parser { text, pos: 0 };
        let expr = p.union()?;
        p.skip_ws();
        if p.pos != text.len() {
            return Err(p.error("trailing input"));
        }
        Ok(expr)
    }
}

impl TryFrom<String> for TypeExpr {
    type Error = SyntaxError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TypeExpr> for String {
    fn from(value: TypeExpr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Name(n) => write!(f, "{n}"),
            TypeExpr::Generic { base, args } => write_list(f, base, args),
            TypeExpr::Literal(values) => write_list(f, "Literal", values),
            TypeExpr::Or(l, r) => write!(f, "{l} | {r}"),
            TypeExpr::None => write!(f, "None"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PARSER
// ————————————————————————————————————————————————————————————————————————————

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> SyntaxError {
        SyntaxError {
            text: self.text.to_string(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SyntaxError> {
        if self.eat(c) { Ok(()) } else { Err(self.error(format!("expected `{c}`"))) }
    }

    fn union(&mut self) -> Result<TypeExpr, SyntaxError> {
        let mut lhs = self.primary()?;
        while self.eat('|') {
            let rhs = self.primary()?;
            lhs = TypeExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<TypeExpr, SyntaxError> {
        self.skip_ws();
        match self.peek() {
            Some('\'') | Some('"') => {
                // forward reference: the quoted text is itself an annotation
                let inner = self.quoted()?;
                TypeExpr::parse(&inner)
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let ident = self.ident();
                if ident == "None" {
                    return Ok(TypeExpr::None);
                }
                if !self.eat('[') {
                    return Ok(TypeExpr::Name(ident));
                }
                if matches!(ident.as_str(), "Literal" | "literal") {
                    let mut values = vec![self.scalar()?];
                    while self.eat(',') {
                        values.push(self.scalar()?);
                    }
                    self.expect(']')?;
                    return Ok(TypeExpr::Literal(values));
                }
                let mut args = vec![self.union()?];
                while self.eat(',') {
                    args.push(self.union()?);
                }
                self.expect(']')?;
                Ok(TypeExpr::Generic { base: ident, args })
            }
            Some(c) => Err(self.error(format!("unexpected `{c}`"))),
            None => Err(self.error("unexpected end of annotation")),
        }
    }

    fn ident(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());
        let out = self.rest()[..len].to_string();
        self.pos += len;
        out
    }

    fn quoted(&mut self) -> Result<String, SyntaxError> {
        let Some(quote) = self.peek() else {
            return Err(self.error("expected string"));
        };
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, esc)) = chars.next() {
                        out.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                }
                c if c == quote => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn scalar(&mut self) -> Result<Scalar, SyntaxError> {
        self.skip_ws();
        match self.peek() {
            Some('\'') | Some('"') => Ok(Scalar::Str(self.quoted()?)),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => {
                let len = self
                    .rest()
                    .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
                    .unwrap_or(self.rest().len());
                let token = &self.rest()[..len];
                let scalar = if let Ok(i) = token.parse::<i64>() {
                    Scalar::Int(i)
                } else if let Ok(f) = token.parse::<f64>() {
                    Scalar::Float(OrderedFloat(f))
                } else {
                    return Err(self.error(format!("bad number `{token}`")));
                };
                self.pos += len;
                Ok(scalar)
            }
            _ => match self.ident().as_str() {
                "true" | "True" => Ok(Scalar::Bool(true)),
                "false" | "False" => Ok(Scalar::Bool(false)),
                other => Err(self.error(format!("`{other}` is not a literal value"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_nested_generics() {
        let expr = TypeExpr::parse("Dict[str, List[Optional['Node']]]").unwrap();
        assert_eq!(
            expr,
            TypeExpr::generic("Dict", vec![
                TypeExpr::name("str"),
                TypeExpr::generic("List", vec![
                    TypeExpr::generic("Optional", vec![TypeExpr::name("Node")]),
                ]),
            ])
        );
    }

    #[test]
    fn parses_bitor_union_with_none() {
        let expr = TypeExpr::parse("int | str | None").unwrap();
        assert_eq!(expr.to_string(), "int | str | None");
        assert!(matches!(expr, TypeExpr::Or(_, ref r) if **r == TypeExpr::None));
    }

    #[test]
    fn parses_literal_scalars() {
        let expr = TypeExpr::parse(r#"Literal["red", 'blue', 3, -1.5, True]"#).unwrap();
        assert_eq!(
            expr,
            TypeExpr::Literal(vec![
                Scalar::Str("red".into()),
                Scalar::Str("blue".into()),
                Scalar::Int(3),
                Scalar::Float(OrderedFloat(-1.5)),
                Scalar::Bool(true),
            ])
        );
    }

    #[test]
    fn display_writes_the_canonical_form() {
        let expr = TypeExpr::parse("Dict[ str,List[ 'Node' ] ]").unwrap();
        assert_eq!(expr.to_string(), "Dict[str, List[Node]]");
        let expr = TypeExpr::parse(r#"Literal['a', 2, 2.0, False]"#).unwrap();
        assert_eq!(expr.to_string(), r#"Literal["a", 2, 2.0, false]"#);
        assert_eq!(TypeExpr::parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn rejects_trailing_garbage() {
        let err = TypeExpr::parse("List[int]]").unwrap_err();
        assert_eq!(err.offset, 9);
        assert!(TypeExpr::parse("List[int").is_err());
        assert!(TypeExpr::parse("").is_err());
    }
}
