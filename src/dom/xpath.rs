//! A compact XPath 1.0 evaluator over parsed documents.
//!
//! Supports location paths with every axis except `namespace`, the `*`,
//! `text()` and `node()` tests, predicates (positional and boolean), unions,
//! comparisons, arithmetic and the core string/number/boolean functions
//! locators tend to use. Element names match case-insensitively.

use crate::dom::document::{normalize_whitespace, Document};
use ego_tree::{NodeId, NodeRef};
use scraper::Node as RawNode;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("xpath: {0}")]
pub struct XPathError(String);

type XResult<T> = std::result::Result<T, XPathError>;

fn err<T>(message: impl Into<String>) -> XResult<T> {
    Err(XPathError(message.into()))
}

/// Evaluates `expression` once per context element and returns the matching
/// elements in document order.
pub fn evaluate(document: &Document, context: &[NodeId], expression: &str) -> XResult<Vec<NodeId>> {
    let expr = Parser::new(tokenize(expression)?).parse()?;
    let evaluator = Evaluator { document };

    let mut found = Vec::new();
    for id in context {
        let ctx = Context {
            item: Item::Node(*id),
            position: 1,
            size: 1,
        };
        match evaluator.eval(&expr, &ctx)? {
            Value::Nodes(items) => found.extend(items.into_iter().filter_map(|item| match item {
                Item::Node(id) if document.element(id).is_some() => Some(id),
                _ => None,
            })),
            _ => return err("expression does not select nodes"),
        }
    }

    document.sort(&mut found);
    Ok(found)
}

// ---------------------------------------------------------------------------
// Lexing

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    Star,
    DoubleColon,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Name(String),
    Literal(String),
    Number(f64),
}

fn tokenize(input: &str) -> XResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let token = match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => {
                i += 1;
                Token::DoubleSlash
            }
            '/' => Token::Slash,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '@' => Token::At,
            ',' => Token::Comma,
            '|' => Token::Pipe,
            '*' => Token::Star,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '=' => Token::Eq,
            ':' if next == Some(':') => {
                i += 1;
                Token::DoubleColon
            }
            '!' if next == Some('=') => {
                i += 1;
                Token::NotEq
            }
            '<' if next == Some('=') => {
                i += 1;
                Token::LtEq
            }
            '<' => Token::Lt,
            '>' if next == Some('=') => {
                i += 1;
                Token::GtEq
            }
            '>' => Token::Gt,
            '.' if next == Some('.') => {
                i += 1;
                Token::DotDot
            }
            '.' if !next.map(|n| n.is_ascii_digit()).unwrap_or(false) => Token::Dot,
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == c)
                    .ok_or_else(|| XPathError("unterminated string literal".into()))?;
                let literal: String = chars[i + 1..i + 1 + end].iter().collect();
                i += end + 1;
                Token::Literal(literal)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i + 1 < chars.len() && (chars[i + 1].is_ascii_digit() || chars[i + 1] == '.') {
                    i += 1;
                }
                let text: String = chars[start..=i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| XPathError(format!("bad number '{}'", text)))?;
                Token::Number(number)
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i + 1 < chars.len() {
                    let n = chars[i + 1];
                    let qualified = n == ':' && chars.get(i + 2).map(|x| *x != ':').unwrap_or(false);
                    if n.is_alphanumeric() || n == '-' || n == '_' || n == '.' || qualified {
                        i += 1;
                    } else {
                        break;
                    }
                }
                Token::Name(chars[start..=i].iter().collect())
            }
            other => return err(format!("unexpected character '{}'", other)),
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parsing

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        let axis = match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            _ => return None,
        };
        Some(axis)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

#[derive(Debug, Clone)]
enum Expr {
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Literal(String),
    Number(f64),
    Call(String, Vec<Expr>),
    /// `absolute` paths start at the document root.
    Path { absolute: bool, steps: Vec<Step> },
    /// A primary expression with predicates, optionally followed by a path.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> XResult<Expr> {
        if self.tokens.is_empty() {
            return err("empty expression");
        }
        let expr = self.or()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => err(format!("unexpected token {:?}", token)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> XResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            err(format!("expected {:?}, found {:?}", token, self.peek()))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> XResult<Expr> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> XResult<Expr> {
        let mut left = self.equality()?;
        while self.eat_keyword("and") {
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(self.equality()?));
        }
        Ok(left)
    }

    fn equality(&mut self) -> XResult<Expr> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.relational()?));
        }
    }

    fn relational(&mut self) -> XResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.additive()?));
        }
    }

    fn additive(&mut self) -> XResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.multiplicative()?));
        }
    }

    fn multiplicative(&mut self) -> XResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Name(name)) if name == "div" => BinaryOp::Div,
                Some(Token::Name(name)) if name == "mod" => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> XResult<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.union()
    }

    fn union(&mut self) -> XResult<Expr> {
        let mut left = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            left = Expr::Binary(BinaryOp::Union, Box::new(left), Box::new(self.path_expr()?));
        }
        Ok(left)
    }

    fn starts_filter_expr(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_)) | Some(Token::Number(_)) | Some(Token::LParen) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen)
                    && !matches!(name.as_str(), "text" | "node" | "comment" | "processing-instruction")
            }
            _ => false,
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_)) | Some(Token::Star) | Some(Token::At) | Some(Token::Dot) | Some(Token::DotDot)
        )
    }

    fn path_expr(&mut self) -> XResult<Expr> {
        if self.starts_filter_expr() {
            let primary = self.primary()?;
            let predicates = self.predicates()?;
            let steps = match self.peek() {
                Some(Token::Slash) | Some(Token::DoubleSlash) => self.continued_steps()?,
                _ => vec![],
            };
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            });
        }

        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let steps = if self.starts_step() {
                    self.relative_steps()?
                } else {
                    vec![]
                };
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => Ok(Expr::Path {
                absolute: true,
                steps: self.continued_steps()?,
            }),
            _ => Ok(Expr::Path {
                absolute: false,
                steps: self.relative_steps()?,
            }),
        }
    }

    /// Steps introduced by a leading `/` or `//`.
    fn continued_steps(&mut self) -> XResult<Vec<Step>> {
        let mut steps = Vec::new();
        match self.advance() {
            Some(Token::DoubleSlash) => steps.push(descendant_or_self()),
            Some(Token::Slash) => {}
            other => return err(format!("expected a path separator, found {:?}", other)),
        }
        steps.extend(self.relative_steps()?);
        Ok(steps)
    }

    fn relative_steps(&mut self) -> XResult<Vec<Step>> {
        let mut steps = vec![self.step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                }
                _ => return Ok(steps),
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> XResult<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: vec![],
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: vec![],
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::DoubleColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name).ok_or_else(|| XPathError(format!("unknown axis '{}'", name)))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.expect(&Token::RParen)?;
                    match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        other => return err(format!("unsupported node test '{}()'", other)),
                    }
                } else {
                    NodeTest::Name(name)
                }
            }
            other => return err(format!("expected a node test, found {:?}", other)),
        };

        Ok(Step {
            axis,
            test,
            predicates: self.predicates()?,
        })
    }

    fn predicates(&mut self) -> XResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn primary(&mut self) -> XResult<Expr> {
        match self.advance() {
            Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Call(name, args))
            }
            other => err(format!("unexpected token {:?}", other)),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: vec![],
    }
}

// ---------------------------------------------------------------------------
// Evaluation

#[derive(Debug, Clone, Copy, PartialEq)]
enum Item {
    Node(NodeId),
    /// Attribute by index on its owner element.
    Attr(NodeId, usize),
}

#[derive(Debug, Clone)]
enum Value {
    Nodes(Vec<Item>),
    Str(String),
    Num(f64),
    Bool(bool),
}

struct Context {
    item: Item,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    document: &'a Document,
}

impl<'a> Evaluator<'a> {
    fn node(&self, id: NodeId) -> XResult<NodeRef<'a, RawNode>> {
        self.document
            .node(id)
            .ok_or_else(|| XPathError("node vanished".into()))
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> XResult<Value> {
        match expr {
            Expr::Literal(text) => Ok(Value::Str(text.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Negate(inner) => Ok(Value::Num(-self.number(&self.eval(inner, ctx)?))),
            Expr::Call(name, args) => self.call(name, args, ctx),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    Item::Node(self.document.tree_root())
                } else {
                    ctx.item
                };
                Ok(Value::Nodes(self.walk(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut items = match self.eval(primary, ctx)? {
                    Value::Nodes(items) => items,
                    _ => return err("predicates and paths need a node-set"),
                };
                for predicate in predicates {
                    items = self.filter(items, predicate)?;
                }
                Ok(Value::Nodes(self.walk(items, steps)?))
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right, ctx),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, ctx: &Context) -> XResult<Value> {
        match op {
            BinaryOp::Or => {
                let l = self.boolean(&self.eval(left, ctx)?);
                Ok(Value::Bool(l || self.boolean(&self.eval(right, ctx)?)))
            }
            BinaryOp::And => {
                let l = self.boolean(&self.eval(left, ctx)?);
                Ok(Value::Bool(l && self.boolean(&self.eval(right, ctx)?)))
            }
            BinaryOp::Union => {
                let (l, r) = (self.eval(left, ctx)?, self.eval(right, ctx)?);
                match (l, r) {
                    (Value::Nodes(mut a), Value::Nodes(b)) => {
                        a.extend(b);
                        Ok(Value::Nodes(self.ordered(a)))
                    }
                    _ => err("union of non node-sets"),
                }
            }
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let (l, r) = (self.eval(left, ctx)?, self.eval(right, ctx)?);
                Ok(Value::Bool(self.compare(op, &l, &r)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.number(&self.eval(left, ctx)?);
                let r = self.number(&self.eval(right, ctx)?);
                Ok(Value::Num(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
        }
    }

    fn compare(&self, op: BinaryOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
                let x = self.string_of(*x);
                b.iter().any(|y| compare_atoms(op, &Value::Str(x.clone()), &Value::Str(self.string_of(*y))))
            }),
            (Value::Nodes(items), other) => match other {
                Value::Bool(_) => compare_atoms(op, &Value::Bool(!items.is_empty()), other),
                _ => items
                    .iter()
                    .any(|item| compare_atoms(op, &Value::Str(self.string_of(*item)), other)),
            },
            (other, Value::Nodes(items)) => match other {
                Value::Bool(_) => compare_atoms(op, other, &Value::Bool(!items.is_empty())),
                _ => items
                    .iter()
                    .any(|item| compare_atoms(op, other, &Value::Str(self.string_of(*item)))),
            },
            _ => compare_atoms(op, left, right),
        }
    }

    fn walk(&self, mut items: Vec<Item>, steps: &[Step]) -> XResult<Vec<Item>> {
        for step in steps {
            let mut next = Vec::new();
            for item in &items {
                let mut selected: Vec<Item> = self
                    .axis(*item, step.axis)?
                    .into_iter()
                    .filter(|candidate| self.test(*candidate, step))
                    .collect();
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate)?;
                }
                next.extend(selected);
            }
            items = self.ordered(next);
        }
        Ok(items)
    }

    /// Applies a predicate with positions taken from the current order.
    fn filter(&self, items: Vec<Item>, predicate: &Expr) -> XResult<Vec<Item>> {
        let size = items.len();
        let mut kept = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let ctx = Context {
                item,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, &ctx)? {
                Value::Num(n) => (n - ctx.position as f64).abs() < f64::EPSILON,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    /// Nodes along an axis in axis order (reverse axes nearest first).
    fn axis(&self, item: Item, axis: Axis) -> XResult<Vec<Item>> {
        let id = match item {
            Item::Node(id) => id,
            Item::Attr(owner, _) => {
                return Ok(match axis {
                    Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf => {
                        let mut items = if axis == Axis::AncestorOrSelf { vec![item] } else { vec![] };
                        items.push(Item::Node(owner));
                        if axis != Axis::Parent {
                            items.extend(self.node(owner)?.ancestors().map(|n| Item::Node(n.id())));
                        }
                        items
                    }
                    Axis::SelfAxis => vec![item],
                    _ => vec![],
                });
            }
        };
        let node = self.node(id)?;
        let ids: Vec<NodeId> = match axis {
            Axis::Child => node.children().map(|n| n.id()).collect(),
            Axis::Descendant => node.descendants().skip(1).map(|n| n.id()).collect(),
            Axis::DescendantOrSelf => node.descendants().map(|n| n.id()).collect(),
            Axis::Parent => node.parent().map(|n| n.id()).into_iter().collect(),
            Axis::Ancestor => node.ancestors().map(|n| n.id()).collect(),
            Axis::AncestorOrSelf => std::iter::once(id).chain(node.ancestors().map(|n| n.id())).collect(),
            Axis::FollowingSibling => node.next_siblings().map(|n| n.id()).collect(),
            Axis::PrecedingSibling => node.prev_siblings().map(|n| n.id()).collect(),
            Axis::SelfAxis => vec![id],
            Axis::Following => {
                let mine = self.document.position(id);
                let inside: Vec<NodeId> = node.descendants().map(|n| n.id()).collect();
                self.node(self.document.tree_root())?
                    .descendants()
                    .map(|n| n.id())
                    .filter(|other| self.document.position(*other) > mine && !inside.contains(other))
                    .collect()
            }
            Axis::Preceding => {
                let mine = self.document.position(id);
                let above: Vec<NodeId> = node.ancestors().map(|n| n.id()).collect();
                let mut ids: Vec<NodeId> = self
                    .node(self.document.tree_root())?
                    .descendants()
                    .map(|n| n.id())
                    .filter(|other| self.document.position(*other) < mine && !above.contains(other))
                    .collect();
                ids.reverse();
                ids
            }
            Axis::Attribute => {
                let count = match node.value() {
                    RawNode::Element(el) => el.attrs().count(),
                    _ => 0,
                };
                return Ok((0..count).map(|index| Item::Attr(id, index)).collect());
            }
        };
        Ok(ids.into_iter().map(Item::Node).collect())
    }

    fn test(&self, item: Item, step: &Step) -> bool {
        match item {
            Item::Attr(owner, index) => match &step.test {
                NodeTest::Any | NodeTest::Node => true,
                NodeTest::Name(name) => self
                    .attribute(owner, index)
                    .map(|(attr, _)| attr.eq_ignore_ascii_case(name))
                    .unwrap_or(false),
                NodeTest::Text => false,
            },
            Item::Node(id) => {
                let node = match self.document.node(id) {
                    Some(node) => node,
                    None => return false,
                };
                match (&step.test, node.value()) {
                    (NodeTest::Node, _) => true,
                    (NodeTest::Text, RawNode::Text(_)) => true,
                    (NodeTest::Any, RawNode::Element(_)) => step.axis != Axis::Attribute,
                    (NodeTest::Name(name), RawNode::Element(el)) => el.name().eq_ignore_ascii_case(name),
                    _ => false,
                }
            }
        }
    }

    fn attribute(&self, owner: NodeId, index: usize) -> Option<(&'a str, &'a str)> {
        match self.document.node(owner)?.value() {
            RawNode::Element(el) => el.attrs().nth(index),
            _ => None,
        }
    }

    fn ordered(&self, mut items: Vec<Item>) -> Vec<Item> {
        items.sort_by_key(|item| match item {
            Item::Node(id) => (self.document.position(*id), 0),
            Item::Attr(owner, index) => (self.document.position(*owner), index + 1),
        });
        items.dedup();
        items
    }

    fn string_of(&self, item: Item) -> String {
        match item {
            Item::Attr(owner, index) => self
                .attribute(owner, index)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default(),
            Item::Node(id) => match self.document.node(id) {
                Some(node) => match node.value() {
                    RawNode::Text(text) => (**text).to_string(),
                    _ => node
                        .descendants()
                        .filter_map(|n| match n.value() {
                            RawNode::Text(text) => Some(&**text),
                            _ => None,
                        })
                        .collect(),
                },
                None => String::new(),
            },
        }
    }

    fn name_of(&self, item: Item) -> String {
        match item {
            Item::Attr(owner, index) => self
                .attribute(owner, index)
                .map(|(name, _)| name.to_string())
                .unwrap_or_default(),
            Item::Node(id) => match self.document.node(id).map(|n| n.value()) {
                Some(RawNode::Element(el)) => el.name().to_string(),
                _ => String::new(),
            },
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Str(text) => text.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Nodes(items) => items.first().map(|item| self.string_of(*item)).unwrap_or_default(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => self.string(other).trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn boolean(&self, value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(text) => !text.is_empty(),
            Value::Nodes(items) => !items.is_empty(),
        }
    }

    fn call(&self, name: &str, args: &[Expr], ctx: &Context) -> XResult<Value> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg, ctx))
            .collect::<XResult<Vec<Value>>>()?;
        let arity = |min: usize, max: usize| -> XResult<()> {
            if values.len() < min || values.len() > max {
                err(format!("{}() takes {}..{} arguments, got {}", name, min, max, values.len()))
            } else {
                Ok(())
            }
        };
        // single optional argument defaulting to the context node
        let subject = |values: &[Value]| -> String {
            values
                .first()
                .map(|v| self.string(v))
                .unwrap_or_else(|| self.string_of(ctx.item))
        };

        let value = match name {
            "last" => {
                arity(0, 0)?;
                Value::Num(ctx.size as f64)
            }
            "position" => {
                arity(0, 0)?;
                Value::Num(ctx.position as f64)
            }
            "count" => {
                arity(1, 1)?;
                match &values[0] {
                    Value::Nodes(items) => Value::Num(items.len() as f64),
                    _ => return err("count() needs a node-set"),
                }
            }
            "string" => {
                arity(0, 1)?;
                Value::Str(subject(&values))
            }
            "concat" => {
                arity(2, usize::MAX)?;
                Value::Str(values.iter().map(|v| self.string(v)).collect())
            }
            "contains" => {
                arity(2, 2)?;
                Value::Bool(self.string(&values[0]).contains(&self.string(&values[1])))
            }
            "starts-with" => {
                arity(2, 2)?;
                Value::Bool(self.string(&values[0]).starts_with(&self.string(&values[1])))
            }
            "ends-with" => {
                arity(2, 2)?;
                Value::Bool(self.string(&values[0]).ends_with(&self.string(&values[1])))
            }
            "substring-before" => {
                arity(2, 2)?;
                let (haystack, needle) = (self.string(&values[0]), self.string(&values[1]));
                Value::Str(haystack.split_once(&needle).map(|(a, _)| a.to_string()).unwrap_or_default())
            }
            "substring-after" => {
                arity(2, 2)?;
                let (haystack, needle) = (self.string(&values[0]), self.string(&values[1]));
                Value::Str(haystack.split_once(&needle).map(|(_, b)| b.to_string()).unwrap_or_default())
            }
            "substring" => {
                arity(2, 3)?;
                let chars: Vec<char> = self.string(&values[0]).chars().collect();
                let start = self.number(&values[1]).round();
                let end = match values.get(2) {
                    Some(len) => start + self.number(len).round(),
                    None => f64::INFINITY,
                };
                Value::Str(
                    chars
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| {
                            let p = (*i + 1) as f64;
                            p >= start && p < end
                        })
                        .map(|(_, c)| *c)
                        .collect(),
                )
            }
            "string-length" => {
                arity(0, 1)?;
                Value::Num(subject(&values).chars().count() as f64)
            }
            "normalize-space" => {
                arity(0, 1)?;
                Value::Str(normalize_whitespace(&subject(&values)))
            }
            "translate" => {
                arity(3, 3)?;
                let from: Vec<char> = self.string(&values[1]).chars().collect();
                let to: Vec<char> = self.string(&values[2]).chars().collect();
                Value::Str(
                    self.string(&values[0])
                        .chars()
                        .filter_map(|c| match from.iter().position(|f| *f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            "lower-case" => {
                arity(1, 1)?;
                Value::Str(self.string(&values[0]).to_lowercase())
            }
            "not" => {
                arity(1, 1)?;
                Value::Bool(!self.boolean(&values[0]))
            }
            "boolean" => {
                arity(1, 1)?;
                Value::Bool(self.boolean(&values[0]))
            }
            "true" => {
                arity(0, 0)?;
                Value::Bool(true)
            }
            "false" => {
                arity(0, 0)?;
                Value::Bool(false)
            }
            "number" => {
                arity(0, 1)?;
                match values.first() {
                    Some(v) => Value::Num(self.number(v)),
                    None => Value::Num(self.number(&Value::Str(self.string_of(ctx.item)))),
                }
            }
            "sum" => {
                arity(1, 1)?;
                match &values[0] {
                    Value::Nodes(items) => Value::Num(
                        items
                            .iter()
                            .map(|item| self.number(&Value::Str(self.string_of(*item))))
                            .sum(),
                    ),
                    _ => return err("sum() needs a node-set"),
                }
            }
            "floor" | "ceiling" | "round" => {
                arity(1, 1)?;
                let n = self.number(&values[0]);
                Value::Num(match name {
                    "floor" => n.floor(),
                    "ceiling" => n.ceil(),
                    _ => n.round(),
                })
            }
            "name" | "local-name" => {
                arity(0, 1)?;
                let item = match values.first() {
                    Some(Value::Nodes(items)) => items.first().copied(),
                    Some(_) => return err(format!("{}() needs a node-set", name)),
                    None => Some(ctx.item),
                };
                Value::Str(item.map(|item| self.name_of(item)).unwrap_or_default())
            }
            other => return err(format!("unknown function '{}()'", other)),
        };
        Ok(value)
    }
}

fn compare_atoms(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = match (left, right) {
                (Value::Bool(a), b) | (b, Value::Bool(a)) => *a == atom_bool(b),
                (Value::Num(a), b) | (b, Value::Num(a)) => *a == atom_number(b),
                (a, b) => atom_string(a) == atom_string(b),
            };
            if matches!(op, BinaryOp::Eq) {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (a, b) = (atom_number(left), atom_number(right));
            match op {
                BinaryOp::Lt => a < b,
                BinaryOp::LtEq => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }
        }
    }
}

fn atom_string(value: &Value) -> String {
    match value {
        Value::Str(text) => text.clone(),
        Value::Num(n) => format_number(*n),
        Value::Bool(b) => b.to_string(),
        Value::Nodes(_) => String::new(),
    }
}

fn atom_number(value: &Value) -> f64 {
    match value {
        Value::Num(n) => *n,
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        other => atom_string(other).trim().parse().unwrap_or(f64::NAN),
    }
}

fn atom_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(text) => !text.is_empty(),
        Value::Nodes(items) => !items.is_empty(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
