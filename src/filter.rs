use crate::comparison::cmp_values;
use crate::node::Node;
use crate::parser::{ParseError, Parser};

/// Predicate used by `#(...)`, `#(...)#` and `[?(...)]` path segments.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Eq(Operand, Operand),
    Ne(Operand, Operand),
    Lt(Operand, Operand),
    Lte(Operand, Operand),
    Gt(Operand, Operand),
    Gte(Operand, Operand),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Truthy(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    CurrentPath(Vec<PathToken>), // @.a['b'][0], or a bare `a.b`
    Literal(Node),               // "abc", 123, true/false/null
    Lower(Box<Operand>),
    Upper(Box<Operand>),
    Length(Box<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathToken {
    Key(String),
    Index(i64),
    Wildcard,
}

/// Parses a complete predicate; trailing input is an error.
pub fn parse_filter(input: &str) -> Result<FilterExpr, ParseError> {
    let mut parser = Parser::new(input);
    let expr = parse_filter_or(&mut parser)?;
    parser.skip_ws();
    if !parser.eof() {
        return Err(ParseError::InvalidSyntax(format!("trailing input in filter: {}", parser.rest())));
    }
    Ok(expr)
}

fn parse_filter_or(parser: &mut Parser) -> Result<FilterExpr, ParseError> {
    let mut left = parse_filter_and(parser)?;
    loop {
        parser.skip_ws();
        if parser.consume_str("||") {
            let right = parse_filter_and(parser)?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_filter_and(parser: &mut Parser) -> Result<FilterExpr, ParseError> {
    let mut left = parse_filter_not(parser)?;
    loop {
        parser.skip_ws();
        if parser.consume_str("&&") {
            let right = parse_filter_not(parser)?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_filter_not(parser: &mut Parser) -> Result<FilterExpr, ParseError> {
    parser.skip_ws();
    if !parser.peek_str("!=") && parser.consume_char('!') {
        let inner = parse_filter_not(parser)?;
        Ok(FilterExpr::Not(Box::new(inner)))
    } else {
        parse_filter_compare(parser)
    }
}

fn parse_filter_compare(parser: &mut Parser) -> Result<FilterExpr, ParseError> {
    parser.skip_ws();
    if parser.consume_char('(') {
        let inner = parse_filter_or(parser)?;
        parser.skip_ws();
        parser.expect(')')?;
        return Ok(inner);
    }
    // `#(==5)` compares the element itself
    let left = if peek_operator(parser).is_some() {
        Operand::CurrentPath(Vec::new())
    } else {
        parse_operand(parser)?
    };
    parser.skip_ws();
    let Some(op) = peek_operator(parser) else {
        return Ok(FilterExpr::Truthy(left));
    };
    parser.consume_str(op);
    parser.skip_ws();
    let right = parse_operand(parser)?;
    Ok(match op {
        "==" => FilterExpr::Eq(left, right),
        "!=" => FilterExpr::Ne(left, right),
        "<" => FilterExpr::Lt(left, right),
        "<=" => FilterExpr::Lte(left, right),
        ">" => FilterExpr::Gt(left, right),
        _ => FilterExpr::Gte(left, right),
    })
}

fn peek_operator(parser: &Parser) -> Option<&'static str> {
    ["==", "!=", "<=", ">=", "<", ">"]
        .into_iter()
        .find(|op| parser.peek_str(op))
}

fn parse_operand(parser: &mut Parser) -> Result<Operand, ParseError> {
    parser.skip_ws();
    if parser.peek_char() == Some('"') || parser.peek_char() == Some('\'') {
        return Ok(Operand::Literal(Node::String(parser.parse_quoted_string()?)));
    }
    for (word, lit) in [("true", Node::Bool(true)), ("false", Node::Bool(false)), ("null", Node::Null)] {
        if consume_keyword(parser, word) {
            return Ok(Operand::Literal(lit));
        }
    }
    for (func, wrap) in [
        ("lower(", Operand::Lower as fn(Box<Operand>) -> Operand),
        ("upper(", Operand::Upper),
        ("length(", Operand::Length),
    ] {
        if parser.consume_str(func) {
            let inner = parse_operand(parser)?;
            parser.skip_ws();
            parser.expect(')')?;
            return Ok(wrap(Box::new(inner)));
        }
    }

    if parser.consume_char('@') {
        return Ok(Operand::CurrentPath(parse_path_tokens(parser, Vec::new())?));
    }

    if parser
        .peek_char()
        .map(|c| c == '-' || c.is_ascii_digit())
        .unwrap_or(false)
    {
        let n = parser.parse_number_literal()?;
        return Ok(Operand::Literal(n));
    }

    // Bare relative path: `name`, `meta.labels[0]`
    if parser.peek_char().is_some_and(|c| c == '_' || c.is_alphabetic()) {
        let first = parser.parse_identifier()?;
        return Ok(Operand::CurrentPath(parse_path_tokens(parser, vec![PathToken::Key(first)])?));
    }
    Err(ParseError::InvalidSyntax("invalid operand".into()))
}

fn consume_keyword(parser: &mut Parser, word: &str) -> bool {
    if !parser.peek_str(word) {
        return false;
    }
    let next = parser.rest()[word.len()..].chars().next();
    if next.is_some_and(|c| c == '_' || c.is_alphanumeric()) {
        return false;
    }
    parser.consume_str(word)
}

fn parse_path_tokens(parser: &mut Parser, mut tokens: Vec<PathToken>) -> Result<Vec<PathToken>, ParseError> {
    loop {
        if parser.consume_char('.') {
            if parser.consume_char('*') {
                tokens.push(PathToken::Wildcard);
                continue;
            }
            let k = parser.parse_identifier()?;
            tokens.push(PathToken::Key(k));
        } else if parser.consume_char('[') {
            if parser.consume_char('*') {
                parser.expect(']')?;
                tokens.push(PathToken::Wildcard);
                continue;
            }
            if parser.peek_char() == Some('"') || parser.peek_char() == Some('\'') {
                let k = parser.parse_quoted_string()?;
                parser.expect(']')?;
                tokens.push(PathToken::Key(k));
                continue;
            }
            let idx_content = parser.capture_until(']')?;
            parser.expect(']')?;
            let idx = Parser::new(idx_content.trim()).parse_int()?;
            tokens.push(PathToken::Index(idx));
        } else {
            return Ok(tokens);
        }
    }
}

pub fn eval_filter(expr: &FilterExpr, current: &Node) -> bool {
    let cmp = |a: &Operand, b: &Operand, pred: fn(std::cmp::Ordering) -> bool| {
        cmp_values(&eval_operand(a, current), &eval_operand(b, current), pred)
    };
    match expr {
        FilterExpr::Eq(a, b) => cmp(a, b, |o| o.is_eq()),
        FilterExpr::Ne(a, b) => cmp(a, b, |o| o.is_ne()),
        FilterExpr::Lt(a, b) => cmp(a, b, |o| o.is_lt()),
        FilterExpr::Lte(a, b) => cmp(a, b, |o| o.is_le()),
        FilterExpr::Gt(a, b) => cmp(a, b, |o| o.is_gt()),
        FilterExpr::Gte(a, b) => cmp(a, b, |o| o.is_ge()),
        FilterExpr::And(l, r) => eval_filter(l, current) && eval_filter(r, current),
        FilterExpr::Or(l, r) => eval_filter(l, current) || eval_filter(r, current),
        FilterExpr::Not(i) => !eval_filter(i, current),
        FilterExpr::Truthy(op) => truthy(&eval_operand(op, current)),
    }
}

fn truthy(v: &Node) -> bool {
    match v {
        Node::Null => false,
        Node::Bool(b) => *b,
        Node::Number(n) => n.as_f64() != 0.0,
        Node::String(s) => !s.is_empty(),
        Node::Sequence(a) => !a.is_empty(),
        Node::Mapping(o) => !o.is_empty(),
    }
}

fn eval_operand(op: &Operand, current: &Node) -> Node {
    match op {
        Operand::Literal(v) => v.clone(),
        Operand::Lower(inner) => match eval_operand(inner, current) {
            Node::String(s) => Node::String(s.to_lowercase()),
            v => v,
        },
        Operand::Upper(inner) => match eval_operand(inner, current) {
            Node::String(s) => Node::String(s.to_uppercase()),
            v => v,
        },
        Operand::Length(inner) => {
            let len = match eval_operand(inner, current) {
                Node::Sequence(a) => a.len(),
                Node::Mapping(m) => m.len(),
                Node::String(s) => s.chars().count(),
                _ => 0,
            };
            Node::from(len as i64)
        }
        Operand::CurrentPath(tokens) => {
            let mut nodes = vec![current];
            for t in tokens {
                nodes = match t {
                    PathToken::Key(k) => nodes.into_iter().filter_map(|n| n.get(k)).collect(),
                    PathToken::Index(i) => nodes
                        .into_iter()
                        .filter_map(|n| match n {
                            Node::Sequence(a) => index_of(a.len(), *i).map(|idx| &a[idx]),
                            _ => None,
                        })
                        .collect(),
                    PathToken::Wildcard => nodes.into_iter().flat_map(children).collect(),
                }
            }
            nodes.first().map(|n| (*n).clone()).unwrap_or(Node::Null)
        }
    }
}

pub(crate) fn children(node: &Node) -> Vec<&Node> {
    match node {
        Node::Sequence(a) => a.iter().collect(),
        Node::Mapping(m) => m.values().collect(),
        _ => Vec::new(),
    }
}

// Negative indices count from the end
pub(crate) fn index_of(len: usize, i: i64) -> Option<usize> {
    let idx = if i < 0 { len as i64 + i } else { i };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}
