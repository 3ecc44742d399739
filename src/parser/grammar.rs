//! Pest grammar parser for cell scripts

use std::sync::{Arc, OnceLock};

use pest::error::{ErrorVariant, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::error::{Result, WorkcellError};
use crate::parser::ast::*;

#[derive(Parser)]
#[grammar = "../grammar/workcell.pest"]
pub struct CellParser;

/// Parse the text of one cell into a program
pub fn parse_program(input: &str) -> Result<Program> {
    let mut pairs = CellParser::parse(Rule::program, input).map_err(syntax_error)?;

    let program = pairs.next().ok_or_else(|| WorkcellError::Syntax {
        line: 1,
        column: 1,
        message: "empty input".to_string(),
    })?;

    Ok(Program {
        statements: parse_statements(program.into_inner())?,
    })
}

fn syntax_error(e: pest::error::Error<Rule>) -> WorkcellError {
    let (line, column) = match e.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };

    let message = match &e.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let mut labels: Vec<&str> = Vec::new();
            for rule in positives {
                let label = rule_label(*rule);
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
            format!("expected {}", labels.join(" or "))
        }
        ErrorVariant::CustomError { message } => message.clone(),
        _ => "unexpected input".to_string(),
    };

    let source_line = e.line().trim();
    WorkcellError::Syntax {
        line,
        column,
        message: if source_line.is_empty() {
            message
        } else {
            format!("{} in `{}`", message, source_line)
        },
    }
}

fn rule_label(rule: Rule) -> &'static str {
    match rule {
        Rule::expr
        | Rule::float
        | Rule::int
        | Rule::string
        | Rule::boolean
        | Rule::none
        | Rule::list
        | Rule::map
        | Rule::ident
        | Rule::neg
        | Rule::not_op => "expression",
        Rule::call | Rule::index | Rule::attr => "operator",
        Rule::or_op
        | Rule::and_op
        | Rule::in_op
        | Rule::eq
        | Rule::ne
        | Rule::le
        | Rule::ge
        | Rule::lt
        | Rule::gt
        | Rule::add
        | Rule::sub
        | Rule::floordiv
        | Rule::mul
        | Rule::div
        | Rule::rem => "operator",
        Rule::assign_op => "assignment",
        Rule::block => "block",
        Rule::statement => "statement",
        Rule::entry => "map entry",
        Rule::EOI => "end of input",
        _ => "token",
    }
}

fn missing(span: pest::Span<'_>, what: &str) -> WorkcellError {
    let (line, column) = span.start_pos().line_col();
    WorkcellError::Syntax {
        line,
        column,
        message: format!("expected {}", what),
    }
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_if
            | Rule::kw_elif
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_in
            | Rule::kw_fn
            | Rule::kw_return
    )
}

/// Inner pairs of a statement, without its keyword tokens
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

// ============================================================================
// Statement Parsing
// ============================================================================

fn parse_statements(pairs: Pairs<'_, Rule>) -> Result<Vec<Stmt>> {
    pairs
        .filter(|p| p.as_rule() == Rule::statement)
        .map(parse_statement)
        .collect()
}

fn parse_block(pair: Pair<'_, Rule>) -> Result<Vec<Stmt>> {
    parse_statements(pair.into_inner())
}

fn parse_statement(pair: Pair<'_, Rule>) -> Result<Stmt> {
    let span = pair.as_span();
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| missing(span, "statement"))?;

    match inner.as_rule() {
        Rule::if_stmt => Ok(Stmt::If(parse_if(inner)?)),
        Rule::while_stmt => Ok(Stmt::While(parse_while(inner)?)),
        Rule::for_stmt => Ok(Stmt::For(parse_for(inner)?)),
        Rule::fn_def => Ok(Stmt::FnDef(Arc::new(parse_fn_def(inner)?))),
        Rule::return_stmt => {
            let value = significant(inner).next().map(parse_expr).transpose()?;
            Ok(Stmt::Return(value))
        }
        Rule::break_stmt => Ok(Stmt::Break),
        Rule::continue_stmt => Ok(Stmt::Continue),
        Rule::assign_stmt => Ok(Stmt::Assign(parse_assign(inner)?)),
        Rule::expr_stmt => {
            let span = inner.as_span();
            let expr = inner
                .into_inner()
                .next()
                .ok_or_else(|| missing(span, "expression"))?;
            Ok(Stmt::Expr(parse_expr(expr)?))
        }
        _ => Err(missing(span, "statement")),
    }
}

fn parse_if(pair: Pair<'_, Rule>) -> Result<IfStatement> {
    let span = pair.as_span();
    let mut inner = significant(pair);

    let condition = inner.next().ok_or_else(|| missing(span, "condition"))?;
    let body = inner.next().ok_or_else(|| missing(span, "block"))?;
    let mut branches = vec![(parse_expr(condition)?, parse_block(body)?)];
    let mut else_body = None;

    for clause in inner {
        let clause_span = clause.as_span();
        match clause.as_rule() {
            Rule::elif_clause => {
                let mut parts = significant(clause);
                let condition = parts
                    .next()
                    .ok_or_else(|| missing(clause_span, "condition"))?;
                let body = parts.next().ok_or_else(|| missing(clause_span, "block"))?;
                branches.push((parse_expr(condition)?, parse_block(body)?));
            }
            Rule::else_clause => {
                let body = significant(clause)
                    .next()
                    .ok_or_else(|| missing(clause_span, "block"))?;
                else_body = Some(parse_block(body)?);
            }
            _ => {}
        }
    }

    Ok(IfStatement {
        branches,
        else_body,
    })
}

fn parse_while(pair: Pair<'_, Rule>) -> Result<WhileLoop> {
    let span = pair.as_span();
    let mut inner = significant(pair);

    let condition = inner.next().ok_or_else(|| missing(span, "condition"))?;
    let body = inner.next().ok_or_else(|| missing(span, "block"))?;

    Ok(WhileLoop {
        condition: parse_expr(condition)?,
        body: parse_block(body)?,
    })
}

fn parse_for(pair: Pair<'_, Rule>) -> Result<ForLoop> {
    let span = pair.as_span();
    let mut inner = significant(pair);

    let var = inner.next().ok_or_else(|| missing(span, "loop variable"))?;
    let iterable = inner.next().ok_or_else(|| missing(span, "iterable"))?;
    let body = inner.next().ok_or_else(|| missing(span, "block"))?;

    Ok(ForLoop {
        iterator_var: var.as_str().to_string(),
        iterable: parse_expr(iterable)?,
        body: parse_block(body)?,
    })
}

fn parse_fn_def(pair: Pair<'_, Rule>) -> Result<FunctionDef> {
    let span = pair.as_span();
    let mut inner = significant(pair);

    let name = inner.next().ok_or_else(|| missing(span, "function name"))?;
    let params = inner.next().ok_or_else(|| missing(span, "parameters"))?;
    let body = inner.next().ok_or_else(|| missing(span, "function body"))?;

    Ok(FunctionDef {
        name: name.as_str().to_string(),
        params: params.into_inner().map(|p| p.as_str().to_string()).collect(),
        body: parse_block(body)?,
    })
}

fn parse_assign(pair: Pair<'_, Rule>) -> Result<Assignment> {
    let span = pair.as_span();
    let mut inner = pair.into_inner();

    let target_pair = inner.next().ok_or_else(|| missing(span, "assignment target"))?;
    let op_pair = inner.next().ok_or_else(|| missing(span, "assignment"))?;
    let value = inner.next().ok_or_else(|| missing(span, "value"))?;

    let mut target_parts = target_pair.into_inner();
    let name = target_parts
        .next()
        .ok_or_else(|| missing(span, "name"))?
        .as_str()
        .to_string();
    let indexes = target_parts
        .map(|index| {
            let index_span = index.as_span();
            let expr = index
                .into_inner()
                .next()
                .ok_or_else(|| missing(index_span, "index"))?;
            parse_expr(expr)
        })
        .collect::<Result<Vec<_>>>()?;

    let op = match op_pair.as_str() {
        "=" => AssignOp::Set,
        "+=" => AssignOp::Add,
        "-=" => AssignOp::Sub,
        "*=" => AssignOp::Mul,
        "/=" => AssignOp::Div,
        _ => return Err(missing(op_pair.as_span(), "assignment operator")),
    };

    Ok(Assignment {
        target: Target { name, indexes },
        op,
        value: parse_expr(value)?,
    })
}

// ============================================================================
// Expression Parsing
// ============================================================================

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::or_op, Assoc::Left))
            .op(Op::infix(Rule::and_op, Assoc::Left))
            .op(Op::prefix(Rule::not_op))
            .op(Op::infix(Rule::eq, Assoc::Left)
                | Op::infix(Rule::ne, Assoc::Left)
                | Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left)
                | Op::infix(Rule::in_op, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::floordiv, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left))
            .op(Op::prefix(Rule::neg))
            .op(Op::postfix(Rule::call) | Op::postfix(Rule::index) | Op::postfix(Rule::attr))
    })
}

fn parse_expr(pair: Pair<'_, Rule>) -> Result<Expr> {
    pratt()
        .map_primary(parse_primary)
        .map_prefix(|op, operand| {
            let operand = Box::new(operand?);
            match op.as_rule() {
                Rule::neg => Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand,
                }),
                Rule::not_op => Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand,
                }),
                _ => Err(missing(op.as_span(), "prefix operator")),
            }
        })
        .map_infix(|lhs, op, rhs| {
            Ok(Expr::Binary {
                op: parse_binary_op(&op)?,
                lhs: Box::new(lhs?),
                rhs: Box::new(rhs?),
            })
        })
        .map_postfix(|lhs, op| parse_postfix(lhs?, op))
        .parse(pair.into_inner())
}

fn parse_binary_op(pair: &Pair<'_, Rule>) -> Result<BinaryOp> {
    Ok(match pair.as_rule() {
        Rule::or_op => BinaryOp::Or,
        Rule::and_op => BinaryOp::And,
        Rule::eq => BinaryOp::Eq,
        Rule::ne => BinaryOp::Ne,
        Rule::lt => BinaryOp::Lt,
        Rule::le => BinaryOp::Le,
        Rule::gt => BinaryOp::Gt,
        Rule::ge => BinaryOp::Ge,
        Rule::in_op => BinaryOp::In,
        Rule::add => BinaryOp::Add,
        Rule::sub => BinaryOp::Sub,
        Rule::mul => BinaryOp::Mul,
        Rule::div => BinaryOp::Div,
        Rule::floordiv => BinaryOp::FloorDiv,
        Rule::rem => BinaryOp::Rem,
        _ => return Err(missing(pair.as_span(), "operator")),
    })
}

fn parse_postfix(lhs: Expr, op: Pair<'_, Rule>) -> Result<Expr> {
    let span = op.as_span();
    match op.as_rule() {
        Rule::call => Ok(Expr::Call {
            callee: Box::new(lhs),
            args: op.into_inner().map(parse_expr).collect::<Result<Vec<_>>>()?,
        }),
        Rule::index => {
            let index = op.into_inner().next().ok_or_else(|| missing(span, "index"))?;
            Ok(Expr::Index {
                object: Box::new(lhs),
                index: Box::new(parse_expr(index)?),
            })
        }
        Rule::attr => {
            let name = op
                .into_inner()
                .next()
                .ok_or_else(|| missing(span, "attribute name"))?;
            Ok(Expr::Attr {
                object: Box::new(lhs),
                name: name.as_str().to_string(),
            })
        }
        _ => Err(missing(span, "operator")),
    }
}

fn parse_primary(pair: Pair<'_, Rule>) -> Result<Expr> {
    let span = pair.as_span();
    match pair.as_rule() {
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(|n| Expr::Literal(Literal::Int(n)))
            .map_err(|_| {
                let (line, column) = span.start_pos().line_col();
                WorkcellError::Syntax {
                    line,
                    column,
                    message: format!("integer literal {} is out of range", pair.as_str()),
                }
            }),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(|n| Expr::Literal(Literal::Float(n)))
            .map_err(|_| missing(span, "number")),
        Rule::string => {
            let text = pair
                .into_inner()
                .next()
                .map(|inner| unescape(inner.as_str()))
                .unwrap_or_default();
            Ok(Expr::Literal(Literal::Str(text)))
        }
        Rule::boolean => Ok(Expr::Literal(Literal::Bool(pair.as_str() == "true"))),
        Rule::none => Ok(Expr::Literal(Literal::None)),
        Rule::ident => Ok(Expr::Name(pair.as_str().to_string())),
        Rule::list => Ok(Expr::List(
            pair.into_inner().map(parse_expr).collect::<Result<Vec<_>>>()?,
        )),
        Rule::map => {
            let entries = pair
                .into_inner()
                .map(|entry| {
                    let entry_span = entry.as_span();
                    let mut parts = entry.into_inner();
                    let key = parts.next().ok_or_else(|| missing(entry_span, "key"))?;
                    let value = parts.next().ok_or_else(|| missing(entry_span, "value"))?;
                    Ok((parse_expr(key)?, parse_expr(value)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::Map(entries))
        }
        Rule::expr => parse_expr(pair),
        _ => Err(missing(span, "expression")),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(input: &str) -> Stmt {
        let program = parse_program(input).unwrap();
        assert_eq!(program.statements.len(), 1, "expected one statement in {:?}", input);
        program.statements.into_iter().next().unwrap()
    }

    fn expr(input: &str) -> Expr {
        match single(input) {
            Stmt::Expr(e) => e,
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    fn int(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Int(n)))
    }

    #[test]
    fn test_parse_empty_program() {
        assert!(parse_program("").unwrap().statements.is_empty());
        assert!(parse_program("\n\n  # only a comment\n").unwrap().statements.is_empty());
    }

    #[test]
    fn test_parse_simple_assignment() {
        match single("x = 1") {
            Stmt::Assign(a) => {
                assert_eq!(a.target.name, "x");
                assert!(a.target.indexes.is_empty());
                assert_eq!(a.op, AssignOp::Set);
                assert_eq!(a.value, Expr::Literal(Literal::Int(1)));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_augmented_and_indexed_assignment() {
        match single("xs[0][\"k\"] += 2") {
            Stmt::Assign(a) => {
                assert_eq!(a.target.name, "xs");
                assert_eq!(a.target.indexes.len(), 2);
                assert_eq!(a.op, AssignOp::Add);
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_equality_is_not_assignment() {
        assert!(matches!(
            expr("x == 1"),
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: int(1),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: int(2),
                    rhs: int(3),
                }),
            }
        );
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        match expr("not a == b") {
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => assert!(matches!(
                *operand,
                Expr::Binary {
                    op: BinaryOp::Eq,
                    ..
                }
            )),
            other => panic!("Expected not, got {:?}", other),
        }
    }

    #[test]
    fn test_method_call_chain() {
        match expr("srv.get(\"Tag\").upper()") {
            Expr::Call { callee, args } => {
                assert!(args.is_empty());
                match *callee {
                    Expr::Attr { name, object } => {
                        assert_eq!(name, "upper");
                        assert!(matches!(*object, Expr::Call { .. }));
                    }
                    other => panic!("Expected attribute, got {:?}", other),
                }
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(expr("2.5"), Expr::Literal(Literal::Float(2.5)));
        assert_eq!(expr("1e3"), Expr::Literal(Literal::Float(1000.0)));
        assert_eq!(expr("true"), Expr::Literal(Literal::Bool(true)));
        assert_eq!(expr("none"), Expr::Literal(Literal::None));
        assert_eq!(
            expr(r#""a\tb\n""#),
            Expr::Literal(Literal::Str("a\tb\n".to_string()))
        );
        assert_eq!(expr("'it\\'s'"), Expr::Literal(Literal::Str("it's".to_string())));
    }

    #[test]
    fn test_parse_collections() {
        match expr("[1, 2, 3,]") {
            Expr::List(items) => assert_eq!(items.len(), 3),
            other => panic!("Expected list, got {:?}", other),
        }
        match expr("{\"a\": 1, \"b\": [2]}") {
            Expr::Map(entries) => assert_eq!(entries.len(), 2),
            other => panic!("Expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        match single("iffy = format_value") {
            Stmt::Assign(a) => {
                assert_eq!(a.target.name, "iffy");
                assert_eq!(a.value, Expr::Name("format_value".to_string()));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
        assert!(parse_program("if = 1").is_err());
    }

    #[test]
    fn test_parse_if_elif_else_across_lines() {
        let program = parse_program(
            r#"
            if x > 1 {
                y = 1
            }
            elif x > 0 { y = 2 }
            else {
                y = 3
            }
        "#,
        )
        .unwrap();
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Stmt::If(i) => {
                assert_eq!(i.branches.len(), 2);
                assert_eq!(i.else_body.as_ref().map(|b| b.len()), Some(1));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_loops_and_functions() {
        let program = parse_program(
            r#"
            fn add(a, b) {
                return a + b
            }
            total = 0
            for i in range(3) { total += add(i, 1) }
            while total > 0 { total -= 1; if total == 2 { break } }
        "#,
        )
        .unwrap();
        assert_eq!(program.statements.len(), 4);
        match &program.statements[0] {
            Stmt::FnDef(def) => {
                assert_eq!(def.name, "add");
                assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
                assert!(matches!(def.body[0], Stmt::Return(Some(_))));
            }
            other => panic!("Expected fn, got {:?}", other),
        }
        assert!(matches!(program.statements[2], Stmt::For(_)));
        assert!(matches!(program.statements[3], Stmt::While(_)));
    }

    #[test]
    fn test_semicolons_and_comments() {
        let program = parse_program("a = 1; b = 2 # trailing\n\nc = 3;").unwrap();
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn test_statements_need_separators() {
        assert!(parse_program("a = 1 b = 2").is_err());
    }

    #[test]
    fn test_syntax_error_location() {
        match parse_program("x = 1\ny = = 2") {
            Err(WorkcellError::Syntax { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("y = = 2"), "message was {}", message);
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_overflow_literal() {
        assert!(parse_program("x = 99999999999999999999").is_err());
    }
}
