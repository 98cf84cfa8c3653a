//! The front end: walks `pest`'s `Pairs<Rule>` produced from `grammar.pest`
//! into the [`crate::ast`] tree lowering consumes. Stands in for the
//! "external" parser the core spec assumes is already available (spec.md
//! §4.F takes a parse tree as a given).

use crate::ast::*;
use crate::error::Result;
use matches::debug_assert_matches;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as DeriveParser;

#[derive(DeriveParser)]
#[grammar = "grammar.pest"]
pub struct LangParser;

pub fn parse(source: &str) -> Result<Program> {
    let mut pairs = LangParser::parse(Rule::program, source)?;
    let program_pair = pairs.next().expect("`program` rule always produces exactly one pair");
    debug_assert_matches!(program_pair.as_rule(), Rule::program);
    Ok(parse_program(program_pair))
}

fn parse_program(pair: Pair<Rule>) -> Program {
    let functions = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::function)
        .map(parse_function)
        .collect();
    Program { functions }
}

fn parse_function(pair: Pair<Rule>) -> Function {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let args = inner
        .next()
        .unwrap()
        .into_inner()
        .map(|p| p.as_str().to_string())
        .collect();
    let body = inner.map(parse_statement).collect();
    Function { name, args, body }
}

fn first_name(pair: Pair<Rule>) -> String {
    pair.into_inner().next().unwrap().as_str().to_string()
}

fn parse_statement(pair: Pair<Rule>) -> Stmt {
    let inner = pair
        .into_inner()
        .next()
        .expect("`statement` always wraps exactly one alternative");
    match inner.as_rule() {
        Rule::if_statement => parse_if(inner),
        Rule::for_statement => parse_for(inner),
        Rule::while_statement => parse_while(inner),
        Rule::do_while_statement => parse_do_while(inner),
        Rule::increment_statement => Stmt::Increment(first_name(inner)),
        Rule::decrement_statement => Stmt::Decrement(first_name(inner)),
        Rule::multi_assign_statement => parse_multi_assign(inner),
        Rule::assign_statement => parse_assign(inner),
        Rule::return_statement => parse_return(inner),
        Rule::call_statement => Stmt::Call(parse_call(inner.into_inner().next().unwrap())),
        other => unreachable!("unexpected statement alternative: {:?}", other),
    }
}

fn parse_assign(pair: Pair<Rule>) -> Stmt {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let op = inner.next().unwrap().as_str().to_string();
    let expr = parse_expr(inner.next().unwrap());
    match op.as_str() {
        "=" => Stmt::Assign(name, expr),
        "+=" => Stmt::CompoundAssign(BinOp::Add, name, expr),
        "-=" => Stmt::CompoundAssign(BinOp::Sub, name, expr),
        "*=" => Stmt::CompoundAssign(BinOp::Mult, name, expr),
        "/=" => Stmt::CompoundAssign(BinOp::Div, name, expr),
        other => unreachable!("unknown assignment operator: {}", other),
    }
}

fn parse_multi_assign(pair: Pair<Rule>) -> Stmt {
    let mut names = Vec::new();
    let mut exprs = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::name => names.push(p.as_str().to_string()),
            Rule::expr => exprs.push(parse_expr(p)),
            _ => {}
        }
    }
    Stmt::MultiAssign(names, exprs)
}

fn parse_return(pair: Pair<Rule>) -> Stmt {
    Stmt::Return(pair.into_inner().map(parse_expr).collect())
}

fn parse_if(pair: Pair<Rule>) -> Stmt {
    let mut inner = pair.into_inner().peekable();

    let cond = parse_cond(inner.next().unwrap());
    let mut body = Vec::new();
    while let Some(p) = inner.peek() {
        if p.as_rule() == Rule::statement {
            body.push(parse_statement(inner.next().unwrap()));
        } else {
            break;
        }
    }
    let mut arms = vec![(cond, body)];
    let mut else_body = None;

    for p in inner {
        match p.as_rule() {
            Rule::elif_clause => {
                let mut elif_inner = p.into_inner();
                let elif_cond = parse_cond(elif_inner.next().unwrap());
                let elif_body = elif_inner.map(parse_statement).collect();
                arms.push((elif_cond, elif_body));
            }
            Rule::else_clause => {
                else_body = Some(p.into_inner().map(parse_statement).collect());
            }
            other => unreachable!("unexpected if-statement tail: {:?}", other),
        }
    }

    Stmt::If { arms, else_body }
}

fn parse_for(pair: Pair<Rule>) -> Stmt {
    let mut inner = pair.into_inner();
    let init = Box::new(parse_for_clause(inner.next().unwrap()));
    let cond = parse_cond(inner.next().unwrap());
    let step = Box::new(parse_for_clause(inner.next().unwrap()));
    let body = inner.map(parse_statement).collect();
    Stmt::For { init, cond, step, body }
}

fn parse_for_clause(pair: Pair<Rule>) -> Stmt {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::increment_statement_bare => Stmt::Increment(first_name(inner)),
        Rule::decrement_statement_bare => Stmt::Decrement(first_name(inner)),
        Rule::assign_statement_bare => parse_assign(inner),
        other => unreachable!("unexpected for-clause alternative: {:?}", other),
    }
}

fn parse_while(pair: Pair<Rule>) -> Stmt {
    let mut inner = pair.into_inner();
    let cond = parse_cond(inner.next().unwrap());
    let body = inner.map(parse_statement).collect();
    Stmt::While { cond, body }
}

fn parse_do_while(pair: Pair<Rule>) -> Stmt {
    let mut parts: Vec<Pair<Rule>> = pair.into_inner().collect();
    let cond_pair = parts.pop().expect("do-while always has a trailing condition");
    let cond = parse_cond(cond_pair);
    let body = parts.into_iter().map(parse_statement).collect();
    Stmt::DoWhile { body, cond }
}

fn parse_cond(pair: Pair<Rule>) -> Cond {
    let mut inner = pair.into_inner();
    let mut result = parse_cond_term(inner.next().unwrap());
    while let Some(op_pair) = inner.next() {
        let term_pair = inner.next().expect("`cond_op` is always followed by a `cond_term`");
        let term = parse_cond_term(term_pair);
        result = match op_pair.as_str() {
            "&&" | "and" => Cond::And(Box::new(result), Box::new(term)),
            "||" | "or" => Cond::Or(Box::new(result), Box::new(term)),
            other => unreachable!("unknown condition operator: {}", other),
        };
    }
    result
}

fn parse_cond_term(pair: Pair<Rule>) -> Cond {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::cond => parse_cond(inner),
        Rule::comparison => parse_comparison(inner),
        other => unreachable!("unexpected condition term: {:?}", other),
    }
}

fn parse_comparison(pair: Pair<Rule>) -> Cond {
    let mut inner = pair.into_inner();
    let left = parse_expr(inner.next().unwrap());
    match inner.next() {
        None => Cond::ZeroCompare(left),
        Some(op_pair) => {
            let op = match op_pair.as_str() {
                "==" => CompareOp::Eq,
                "!=" => CompareOp::Ne,
                ">=" => CompareOp::Ge,
                "<=" => CompareOp::Le,
                ">" => CompareOp::Gt,
                "<" => CompareOp::Lt,
                other => unreachable!("unknown comparison operator: {}", other),
            };
            let right = parse_expr(inner.next().expect("`cmp_op` is always followed by an `expr`"));
            Cond::Compare(op, left, right)
        }
    }
}

fn parse_expr(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let mut result = parse_term(inner.next().unwrap());
    while let Some(op_pair) = inner.next() {
        let rhs = parse_term(inner.next().expect("`sum_op` is always followed by a `term`"));
        let op = match op_pair.as_str() {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "&" => BinOp::And,
            "|" => BinOp::Or,
            "^" => BinOp::Xor,
            other => unreachable!("unknown sum operator: {}", other),
        };
        result = Expr::Binary(op, Box::new(result), Box::new(rhs));
    }
    result
}

fn parse_term(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let mut result = parse_unary(inner.next().unwrap());
    while let Some(op_pair) = inner.next() {
        let rhs = parse_unary(inner.next().expect("`product_op` is always followed by a `unary`"));
        let op = match op_pair.as_str() {
            "*" => BinOp::Mult,
            "/" => BinOp::Div,
            "%" => BinOp::Quot,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            other => unreachable!("unknown product operator: {}", other),
        };
        result = Expr::Binary(op, Box::new(result), Box::new(rhs));
    }
    result
}

fn parse_unary(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap();
    match first.as_rule() {
        Rule::unary_op => {
            let atom = parse_atom(inner.next().expect("`unary_op` is always followed by an `atom`"));
            let op = match first.as_str() {
                "~" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                other => unreachable!("unknown unary operator: {}", other),
            };
            Expr::Unary(op, Box::new(atom))
        }
        Rule::atom => parse_atom(first),
        other => unreachable!("unexpected unary alternative: {:?}", other),
    }
}

fn parse_atom(pair: Pair<Rule>) -> Expr {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::hex_number => Expr::Int(
            i32::from_str_radix(&inner.as_str()[2..], 16)
                .expect("`hex_number` only ever matches valid hex digits"),
        ),
        Rule::number => Expr::Int(
            inner
                .as_str()
                .parse()
                .expect("`number` only ever matches ASCII digits"),
        ),
        Rule::call => parse_call(inner),
        Rule::name => Expr::Var(inner.as_str().to_string()),
        Rule::expr => parse_expr(inner),
        other => unreachable!("unexpected atom alternative: {:?}", other),
    }
}

fn parse_call(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let args = inner.map(parse_expr).collect();
    Expr::Call(name, args)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_trivial_function() {
        let program = parse("int main() { return 0; }").unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
        assert_eq!(program.functions[0].body, vec![Stmt::Return(vec![Expr::Int(0)])]);
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let program = parse("int main() { a = 1 + 2 * 3; return 0; }").unwrap();
        assert_eq!(
            program.functions[0].body[0],
            Stmt::Assign(
                "a".to_string(),
                Expr::Binary(
                    BinOp::Add,
                    Box::new(Expr::Int(1)),
                    Box::new(Expr::Binary(BinOp::Mult, Box::new(Expr::Int(2)), Box::new(Expr::Int(3)))),
                ),
            )
        );
    }

    #[test]
    fn parses_hex_literals_and_calls() {
        let program = parse("int main() { a = foo(0x1F, b); return 0; }").unwrap();
        assert_eq!(
            program.functions[0].body[0],
            Stmt::Assign(
                "a".to_string(),
                Expr::Call("foo".to_string(), vec![Expr::Int(31), Expr::Var("b".to_string())]),
            )
        );
    }
}
