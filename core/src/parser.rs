//! A small Lisp reader: tokenizer, S-expression parser, and an
//! AST-construction dispatch over the node shapes in [`crate::ast`].
//!
//! This exists purely so the crate is runnable end-to-end from source text
//! and so the end-to-end scenarios can be exercised as integration tests —
//! the code generator's actual contract is the [`crate::ast::Node`] tree,
//! not source syntax, and textual parsing is explicitly an external
//! collaborator's job upstream of this crate in a full toolchain.

use crate::ast::{BinOp, Node};
use crate::error::{Error, Result};

/// One lexical token: a parenthesis, or any other whitespace-delimited run
/// of characters (including a quoted string, kept together with its
/// quotes).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Atom(String),
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut s = String::from("\"");
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            s.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                    } else if c == '"' {
                        break;
                    } else {
                        s.push(c);
                    }
                }
                s.push('"');
                tokens.push(Token::Atom(s));
            }
            _ => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                tokens.push(Token::Atom(s));
            }
        }
    }
    tokens
}

/// A raw S-expression, one layer below the typed [`Node`] contract.
#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    List(Vec<Sexp>),
    Symbol(String),
    Number(i64),
    Str(String),
    /// The `[N]` array-size marker token.
    Size(usize),
}

struct Reader {
    tokens: Vec<Token>,
    pos: usize,
}

impl Reader {
    fn new(source: &str) -> Self {
        Self { tokens: tokenize(source), pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn read(&mut self) -> Result<Sexp> {
        match self.tokens.get(self.pos) {
            Some(Token::LParen) => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    match self.tokens.get(self.pos) {
                        Some(Token::RParen) => {
                            self.pos += 1;
                            break;
                        }
                        None => return Err(Error::UnknownNode("unterminated list".into())),
                        _ => items.push(self.read()?),
                    }
                }
                Ok(Sexp::List(items))
            }
            Some(Token::RParen) => Err(Error::UnknownNode("unexpected )".into())),
            Some(Token::Atom(text)) => {
                let text = text.clone();
                self.pos += 1;
                Ok(atom(&text))
            }
            None => Err(Error::UnknownNode("unexpected end of input".into())),
        }
    }
}

fn atom(token: &str) -> Sexp {
    if let Some(inner) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Sexp::Str(inner.to_string());
    }
    if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        if let Ok(n) = inner.parse::<usize>() {
            return Sexp::Size(n);
        }
    }
    if let Ok(n) = token.parse::<i64>() {
        return Sexp::Number(n);
    }
    Sexp::Symbol(token.to_string())
}

/// Parse `source` into a sequence of top-level statements.
///
/// # Errors
/// Returns [`Error::UnknownNode`] on malformed syntax or a head symbol this
/// reader does not recognize.
pub fn parse_program(source: &str) -> Result<Vec<Node>> {
    let mut reader = Reader::new(source);
    let mut program = Vec::new();
    while !reader.at_end() {
        let sexp = reader.read()?;
        program.push(node_from_sexp(&sexp)?);
    }
    Ok(program)
}

fn node_from_sexp(sexp: &Sexp) -> Result<Node> {
    match sexp {
        Sexp::Number(n) => Ok(Node::Number(*n)),
        Sexp::Str(s) => Ok(Node::Str(s.clone())),
        Sexp::Symbol(name) => Ok(Node::Var { name: name.clone(), expr: None, size: None }),
        Sexp::Size(_) => Err(Error::UnknownNode("array-size marker outside a var form".into())),
        Sexp::List(items) => list_to_node(items),
    }
}

fn symbol(sexp: &Sexp) -> Result<String> {
    match sexp {
        Sexp::Symbol(s) => Ok(s.clone()),
        other => Err(Error::UnknownNode(format!("expected a symbol, got {other:?}"))),
    }
}

fn list_to_node(items: &[Sexp]) -> Result<Node> {
    let Some((head, args)) = items.split_first() else {
        return Err(Error::UnknownNode("empty list".into()));
    };
    let head = symbol(head)?;

    if let Some(op) = binop_for(&head) {
        let left = node_from_sexp(&args[0])?;
        let right = node_from_sexp(&args[1])?;
        return Ok(Node::BinOp { op, left: Box::new(left), right: Box::new(right) });
    }

    match head.as_str() {
        "var" => {
            let name = symbol(&args[0])?;
            if let Sexp::Size(size) = &args[1] {
                Ok(Node::Var { name, expr: None, size: Some(*size) })
            } else {
                let expr = node_from_sexp(&args[1])?;
                Ok(Node::Var { name, expr: Some(Box::new(expr)), size: None })
            }
        }
        "set" => {
            // `(set name expr)` or `(set (get arr idx) expr)`.
            let expr = node_from_sexp(&args[1])?;
            match &args[0] {
                Sexp::List(target) if symbol(&target[0])? == "get" => {
                    let array = symbol(&target[1])?;
                    let index = node_from_sexp(&target[2])?;
                    Ok(Node::SetGet { array, index: Box::new(index), expr: Box::new(expr) })
                }
                other => Ok(Node::Set { name: symbol(other)?, expr: Box::new(expr) }),
            }
        }
        "defunc" => {
            let name = symbol(&args[0])?;
            let Sexp::List(param_list) = &args[1] else {
                return Err(Error::UnknownNode("defunc params must be a list".into()));
            };
            let params = param_list.iter().map(symbol).collect::<Result<Vec<_>>>()?;
            let Sexp::List(body_list) = &args[2] else {
                return Err(Error::UnknownNode("defunc body must be a list".into()));
            };
            let body = body_list.iter().map(node_from_sexp).collect::<Result<Vec<_>>>()?;
            Ok(Node::Defunc { name, params, body })
        }
        "if" => {
            let cond = node_from_sexp(&args[0])?;
            let Sexp::List(then_list) = &args[1] else {
                return Err(Error::UnknownNode("if-then must be a list".into()));
            };
            let then = then_list.iter().map(node_from_sexp).collect::<Result<Vec<_>>>()?;
            let r#else = match args.get(2) {
                Some(Sexp::List(items)) => {
                    Some(items.iter().map(node_from_sexp).collect::<Result<Vec<_>>>()?)
                }
                Some(other) => return Err(Error::UnknownNode(format!("if-else must be a list, got {other:?}"))),
                None => None,
            };
            Ok(Node::If { cond: Box::new(cond), then, r#else })
        }
        "while" => {
            let cond = node_from_sexp(&args[0])?;
            let Sexp::List(body_list) = &args[1] else {
                return Err(Error::UnknownNode("while body must be a list".into()));
            };
            let body = body_list.iter().map(node_from_sexp).collect::<Result<Vec<_>>>()?;
            Ok(Node::While { cond: Box::new(cond), body })
        }
        "print_string" => Ok(Node::PrintString(Box::new(node_from_sexp(&args[0])?))),
        "read_line" => Ok(Node::ReadLine(symbol(&args[0])?)),
        "funcall" => {
            let name = symbol(&args[0])?;
            let mut call_args = Vec::new();
            for a in &args[1..] {
                let Sexp::List(wrapped) = a else {
                    return Err(Error::UnknownNode("funcall argument must be a wrapped expression".into()));
                };
                call_args.push(node_from_sexp(&wrapped[0])?);
            }
            Ok(Node::Funcall { name, args: call_args })
        }
        "get" => {
            let array = symbol(&args[0])?;
            let index = node_from_sexp(&args[1])?;
            Ok(Node::Get { array, index: Box::new(index) })
        }
        other => Err(Error::UnknownNode(other.to_string())),
    }
}

fn binop_for(head: &str) -> Option<BinOp> {
    match head {
        "+" => Some(BinOp::Add),
        "-" => Some(BinOp::Sub),
        "*" => Some(BinOp::Mul),
        "/" => Some(BinOp::Div),
        "=" => Some(BinOp::Eq),
        "<" => Some(BinOp::Lt),
        ">" => Some(BinOp::Gt),
        "!=" => Some(BinOp::Ne),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hello_world() {
        let program = parse_program(r#"(print_string "Hi")"#).unwrap();
        assert_eq!(program, vec![Node::PrintString(Box::new(Node::Str("Hi".into())))]);
    }

    #[test]
    fn parses_var_declaration_and_read_line() {
        let program = parse_program("(var x 0)(read_line x)").unwrap();
        assert_eq!(
            program[0],
            Node::Var { name: "x".into(), expr: Some(Box::new(Node::Number(0))), size: None }
        );
        assert_eq!(program[1], Node::ReadLine("x".into()));
    }

    #[test]
    fn parses_array_declaration_with_size_marker() {
        let program = parse_program("(var a [5])").unwrap();
        assert_eq!(program[0], Node::Var { name: "a".into(), expr: None, size: Some(5) });
    }

    #[test]
    fn parses_while_loop() {
        let program = parse_program("(var i 0)(while (< i 3) ((set i (+ i 1))))").unwrap();
        assert!(matches!(program[1], Node::While { .. }));
    }

    #[test]
    fn parses_defunc_and_funcall() {
        let program = parse_program("(defunc f (x) ((set x (+ x 1)))) (funcall f (41))").unwrap();
        assert!(matches!(program[0], Node::Defunc { .. }));
        assert!(matches!(program[1], Node::Funcall { .. }));
    }

    #[test]
    fn unknown_head_symbol_is_an_error() {
        assert!(parse_program("(frobnicate 1 2)").is_err());
    }
}
