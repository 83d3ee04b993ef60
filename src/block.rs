//! Line-oriented statement parsing and multi-line control blocks.
//!
//! A program is a sequence of statements, one per source line.  A statement
//! either opens a multi-line block (IF, WHILE, DO, SELECT, FUNCTION, CLASS),
//! closed by its matching end keyword, or is a single-line action: an
//! assignment, a constant binding, a bare expression, or one of the simple
//! keywords (PRINT, BREAK, EXIT, RETURN, RAISE).
//!
//! Parsing is recursive over lines; a nested block consumes its own closer,
//! so a closer seen at the current level always belongs to the block being
//! parsed.  Condition and label expressions are kept as source text and
//! handed to [`Evaluator`]s at execution time, re-parsed on every loop
//! iteration so each pass evaluates fresh.

use std::rc::Rc;

use log::debug;
use phf::phf_map;

use crate::error::{BasicError, Result};
use crate::evaluator::Evaluator;
use crate::exec::Runtime;
use crate::ops::{canon, values_equal};
use crate::scanner::{skip_quoted, split_arguments, Scanner};
use crate::scope::{ClassDef, FunctionDef, ScopeId};

/// One parsed statement.
#[derive(Debug, Clone)]
pub enum Node {
    Assign {
        target: AssignTarget,
        expr: String,
        line: usize,
    },
    Const {
        name: String,
        expr: String,
        line: usize,
    },
    Expr {
        expr: String,
        line: usize,
    },
    Print {
        args: Vec<String>,
        line: usize,
    },
    If(IfBlock),
    While(WhileBlock),
    Do(DoBlock),
    Select(SelectBlock),
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return {
        expr: Option<String>,
        line: usize,
    },
    Raise {
        expr: String,
        line: usize,
    },
    Break {
        line: usize,
    },
    Exit {
        line: usize,
    },
}

/// The left-hand side of an assignment.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    /// `name$ = ...`
    Variable { name: String },
    /// `name$[i][j] = ...` (index expressions kept as source text)
    Element { name: String, indices: Vec<String> },
    /// `obj$.field$ = ...`
    Member { object: String, field: String },
}

#[derive(Debug, Clone)]
pub struct IfBlock {
    pub condition: String,
    pub then_body: Vec<Node>,
    pub else_body: Vec<Node>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct WhileBlock {
    pub condition: String,
    pub body: Vec<Node>,
    pub line: usize,
}

/// Post-tested loop.  An UNTIL exit condition is rewritten once at parse
/// time into its WHILE form, so execution only knows one polarity.
#[derive(Debug, Clone)]
pub struct DoBlock {
    pub condition: String,
    pub body: Vec<Node>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct SelectBlock {
    pub selector: String,
    pub cases: Vec<CaseArm>,
    pub default: Option<Vec<Node>>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct CaseArm {
    pub label: String,
    pub body: Vec<Node>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    If,
    Else,
    EndIf,
    While,
    EndWhile,
    Do,
    Loop,
    Select,
    Case,
    Default,
    EndSelect,
    Function,
    EndFunction,
    Class,
    EndClass,
    Let,
    Const,
    Print,
    Break,
    Exit,
    Return,
    Raise,
    Rem,
}

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "IF" => Keyword::If,
    "ELSE" => Keyword::Else,
    "ENDIF" => Keyword::EndIf,
    "WHILE" => Keyword::While,
    "ENDWHILE" => Keyword::EndWhile,
    "DO" => Keyword::Do,
    "LOOP" => Keyword::Loop,
    "SELECT" => Keyword::Select,
    "CASE" => Keyword::Case,
    "DEFAULT" => Keyword::Default,
    "ENDSELECT" => Keyword::EndSelect,
    "FUNCTION" => Keyword::Function,
    "ENDFUNCTION" => Keyword::EndFunction,
    "CLASS" => Keyword::Class,
    "ENDCLASS" => Keyword::EndClass,
    "LET" => Keyword::Let,
    "CONST" => Keyword::Const,
    "PRINT" => Keyword::Print,
    "BREAK" => Keyword::Break,
    "EXIT" => Keyword::Exit,
    "RETURN" => Keyword::Return,
    "RAISE" => Keyword::Raise,
    "REM" => Keyword::Rem,
};

/// Parse a whole program.  Line numbers are 1-based over `source`.
pub fn parse_program(source: &str) -> Result<Vec<Node>> {
    let lines: Vec<&str> = source.lines().collect();
    let mut parser = Parser { lines, pos: 0 };
    let nodes = parser.parse_block(&[], "", 0).map(|(nodes, ..)| nodes)?;
    debug!("Parsed program: {} top-level statements", nodes.len());
    Ok(nodes)
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl Parser<'_> {
    /// Parse statements until one of `stops` closes the block (or until end
    /// of input at the top level, where `stops` is empty).  Returns the
    /// body, the closer found, the rest of the closer's line, and the
    /// closer's line number.
    fn parse_block(
        &mut self,
        stops: &[Keyword],
        opener: &str,
        opener_line: usize,
    ) -> Result<(Vec<Node>, Keyword, String, usize)> {
        let mut nodes = Vec::new();

        while self.pos < self.lines.len() {
            let line = self.pos + 1;
            let text = self.lines[self.pos].trim();
            self.pos += 1;

            if text.is_empty() {
                continue;
            }

            let (keyword, rest) = split_keyword(text);

            match keyword {
                Some(Keyword::Rem) => continue,
                Some(kw) if stops.contains(&kw) => {
                    return Ok((nodes, kw, rest.to_string(), line));
                }
                Some(
                    kw @ (Keyword::Else
                    | Keyword::EndIf
                    | Keyword::EndWhile
                    | Keyword::Loop
                    | Keyword::Case
                    | Keyword::Default
                    | Keyword::EndSelect
                    | Keyword::EndFunction
                    | Keyword::EndClass),
                ) => {
                    return Err(BasicError::parse(
                        line,
                        format!("Unexpected '{}'", keyword_text(kw)),
                    ));
                }
                _ => nodes.push(self.parse_statement(keyword, rest, line)?),
            }
        }

        if stops.is_empty() {
            // Top level: end of input closes the program.
            return Ok((nodes, Keyword::Rem, String::new(), self.lines.len()));
        }

        Err(BasicError::UnterminatedBlock {
            keyword: opener.to_string(),
            line: opener_line,
        })
    }

    fn parse_statement(&mut self, keyword: Option<Keyword>, rest: &str, line: usize) -> Result<Node> {
        match keyword {
            Some(Keyword::If) => self.parse_if(rest, line),
            Some(Keyword::While) => self.parse_while(rest, line),
            Some(Keyword::Do) => self.parse_do(rest, line),
            Some(Keyword::Select) => self.parse_select(rest, line),
            Some(Keyword::Function) => {
                let def = self.parse_function(rest, line)?;
                Ok(Node::FunctionDef(def))
            }
            Some(Keyword::Class) => self.parse_class(rest, line),

            Some(Keyword::Let) => parse_assignment(rest, line)?.ok_or_else(|| {
                BasicError::parse(line, "LET requires an assignment".to_string())
            }),

            Some(Keyword::Const) => {
                let Some(at) = find_assignment(rest, line)? else {
                    return Err(BasicError::parse(
                        line,
                        "CONST requires 'name$ = expression'".to_string(),
                    ));
                };
                let name = parse_bare_variable(&rest[..at], line)?;
                Ok(Node::Const {
                    name,
                    expr: rest[at + 1..].trim().to_string(),
                    line,
                })
            }

            Some(Keyword::Print) => Ok(Node::Print {
                args: split_arguments(rest, line)?,
                line,
            }),

            Some(Keyword::Break) => {
                require_empty(rest, "BREAK", line)?;
                Ok(Node::Break { line })
            }
            Some(Keyword::Exit) => {
                require_empty(rest, "EXIT", line)?;
                Ok(Node::Exit { line })
            }

            Some(Keyword::Return) => {
                let rest = rest.trim();
                Ok(Node::Return {
                    expr: (!rest.is_empty()).then(|| rest.to_string()),
                    line,
                })
            }
            Some(Keyword::Raise) => {
                let rest = rest.trim();
                if rest.is_empty() {
                    return Err(BasicError::parse(
                        line,
                        "RAISE requires an expression".to_string(),
                    ));
                }
                Ok(Node::Raise {
                    expr: rest.to_string(),
                    line,
                })
            }

            // Closers and REM are filtered out by the block loop.
            Some(_) => unreachable!("closer keywords handled by parse_block"),

            None => match parse_assignment(rest, line)? {
                Some(node) => Ok(node),
                None => Ok(Node::Expr {
                    expr: rest.to_string(),
                    line,
                }),
            },
        }
    }

    fn parse_if(&mut self, rest: &str, line: usize) -> Result<Node> {
        let condition = strip_then(rest, line)?;

        let (then_body, stop, tail, stop_line) =
            self.parse_block(&[Keyword::Else, Keyword::EndIf], "IF", line)?;
        require_empty(&tail, keyword_text(stop), stop_line)?;

        let else_body = if stop == Keyword::Else {
            let (body, _, tail, end_line) = self.parse_block(&[Keyword::EndIf], "IF", line)?;
            require_empty(&tail, "ENDIF", end_line)?;
            body
        } else {
            Vec::new()
        };

        Ok(Node::If(IfBlock {
            condition,
            then_body,
            else_body,
            line,
        }))
    }

    fn parse_while(&mut self, rest: &str, line: usize) -> Result<Node> {
        let condition = rest.trim().to_string();
        if condition.is_empty() {
            return Err(BasicError::parse(
                line,
                "WHILE requires a condition".to_string(),
            ));
        }

        let (body, _, tail, end_line) = self.parse_block(&[Keyword::EndWhile], "WHILE", line)?;
        require_empty(&tail, "ENDWHILE", end_line)?;

        Ok(Node::While(WhileBlock {
            condition,
            body,
            line,
        }))
    }

    fn parse_do(&mut self, rest: &str, line: usize) -> Result<Node> {
        require_empty(rest, "DO", line)?;

        let (body, _, tail, stop_line) = self.parse_block(&[Keyword::Loop], "DO", line)?;

        let tail = tail.trim();
        let split = tail
            .find(|c: char| c.is_whitespace())
            .unwrap_or(tail.len());
        let (head, cond) = tail.split_at(split);
        let cond = cond.trim();

        let condition = match canon(head).as_str() {
            "WHILE" if !cond.is_empty() => cond.to_string(),
            "UNTIL" if !cond.is_empty() => format!("NOT ({})", cond),
            _ => {
                return Err(BasicError::parse(
                    stop_line,
                    "LOOP requires 'WHILE <cond>' or 'UNTIL <cond>'".to_string(),
                ))
            }
        };

        Ok(Node::Do(DoBlock {
            condition,
            body,
            line: stop_line,
        }))
    }

    fn parse_select(&mut self, rest: &str, line: usize) -> Result<Node> {
        let selector = rest.trim().to_string();
        if selector.is_empty() {
            return Err(BasicError::parse(
                line,
                "SELECT requires a selector expression".to_string(),
            ));
        }

        let arms = [Keyword::Case, Keyword::Default, Keyword::EndSelect];
        let (lead, mut stop, mut tail, mut stop_line) = self.parse_block(&arms, "SELECT", line)?;
        if !lead.is_empty() {
            return Err(BasicError::parse(
                line,
                "Statements before the first CASE".to_string(),
            ));
        }

        let mut cases: Vec<CaseArm> = Vec::new();
        let mut default = None;

        loop {
            match stop {
                Keyword::Case => {
                    let label = tail.trim().to_string();
                    if label.is_empty() {
                        return Err(BasicError::parse(
                            stop_line,
                            "CASE requires a label expression".to_string(),
                        ));
                    }
                    // Textually identical labels are a fatal duplicate at
                    // parse time; value-level duplicates are caught again
                    // when the dispatch table is built.
                    if cases.iter().any(|arm| arm.label.eq_ignore_ascii_case(&label)) {
                        return Err(BasicError::DuplicateCase {
                            label,
                            line: stop_line,
                        });
                    }

                    let (body, s, t, sl) = self.parse_block(&arms, "SELECT", line)?;
                    cases.push(CaseArm {
                        label,
                        body,
                        line: stop_line,
                    });
                    stop = s;
                    tail = t;
                    stop_line = sl;
                }

                Keyword::Default => {
                    require_empty(&tail, "DEFAULT", stop_line)?;
                    // DEFAULT must be the final arm.
                    let (body, _, t, sl) =
                        self.parse_block(&[Keyword::EndSelect], "SELECT", line)?;
                    require_empty(&t, "ENDSELECT", sl)?;
                    default = Some(body);
                    break;
                }

                _ => {
                    require_empty(&tail, "ENDSELECT", stop_line)?;
                    break;
                }
            }
        }

        Ok(Node::Select(SelectBlock {
            selector,
            cases,
            default,
            line,
        }))
    }

    fn parse_function(&mut self, rest: &str, line: usize) -> Result<FunctionDef> {
        let (name, params) = parse_signature(rest, line)?;

        let (body, _, tail, end_line) =
            self.parse_block(&[Keyword::EndFunction], "FUNCTION", line)?;
        require_empty(&tail, "ENDFUNCTION", end_line)?;

        Ok(FunctionDef {
            name,
            params,
            body: Rc::new(body),
            line,
        })
    }

    fn parse_class(&mut self, rest: &str, line: usize) -> Result<Node> {
        let mut words = rest.split_whitespace();
        let Some(name) = words.next() else {
            return Err(BasicError::parse(line, "CLASS requires a name".to_string()));
        };
        check_identifier(name, line)?;

        let parent = match words.next() {
            None => None,
            Some(word) if canon(word) == "EXTENDS" => {
                let Some(parent) = words.next() else {
                    return Err(BasicError::parse(
                        line,
                        "EXTENDS requires a parent class name".to_string(),
                    ));
                };
                check_identifier(parent, line)?;
                Some(parent.to_string())
            }
            Some(word) => {
                return Err(BasicError::parse(
                    line,
                    format!("Unexpected '{}' after class name", word),
                ))
            }
        };
        if words.next().is_some() {
            return Err(BasicError::parse(
                line,
                "Unexpected text after class header".to_string(),
            ));
        }

        let (body, _, tail, end_line) = self.parse_block(&[Keyword::EndClass], "CLASS", line)?;
        require_empty(&tail, "ENDCLASS", end_line)?;

        let mut methods = Vec::new();
        let mut initializers = Vec::new();
        for node in body {
            match node {
                Node::FunctionDef(def) => methods.push(def),
                other => initializers.push(other),
            }
        }

        Ok(Node::ClassDef(ClassDef {
            name: name.to_string(),
            parent,
            initializers: Rc::new(initializers),
            methods,
            line,
        }))
    }
}

// ────────────────────────────── execution ────────────────────────────────

impl IfBlock {
    pub fn execute(&self, rt: &mut Runtime, scope: ScopeId) -> Result<()> {
        let taken = rt
            .eval_expr(scope, &self.condition, self.line)?
            .is_truthy();
        debug!("IF at line {} took {} branch", self.line, if taken { "then" } else { "else" });

        let body = if taken { &self.then_body } else { &self.else_body };
        rt.execute(scope, body)
    }
}

impl WhileBlock {
    pub fn execute(&self, rt: &mut Runtime, scope: ScopeId) -> Result<()> {
        let mut condition = Evaluator::new(self.condition.clone(), self.line);

        loop {
            condition.invalidate();
            if !condition.evaluate(rt, scope)?.is_truthy() {
                return Ok(());
            }

            rt.execute(scope, &self.body)?;
            if rt.break_request {
                // A BREAK stops here; a RETURN keeps unwinding to the
                // enclosing call frame.
                if !rt.returning() {
                    rt.break_request = false;
                }
                return Ok(());
            }
            if rt.exit_request {
                return Ok(());
            }
        }
    }
}

impl DoBlock {
    /// The body always runs at least once; the condition is tested after.
    pub fn execute(&self, rt: &mut Runtime, scope: ScopeId) -> Result<()> {
        let mut condition = Evaluator::new(self.condition.clone(), self.line);

        loop {
            rt.execute(scope, &self.body)?;
            if rt.break_request {
                if !rt.returning() {
                    rt.break_request = false;
                }
                return Ok(());
            }
            if rt.exit_request {
                return Ok(());
            }

            condition.invalidate();
            if !condition.evaluate(rt, scope)?.is_truthy() {
                return Ok(());
            }
        }
    }
}

impl SelectBlock {
    /// The selector evaluates exactly once.  The dispatch table is rebuilt
    /// per execution so labels reflect current variable values; two labels
    /// resolving to equal values are fatal even when neither arm matches.
    pub fn execute(&self, rt: &mut Runtime, scope: ScopeId) -> Result<()> {
        let selector = rt.eval_expr(scope, &self.selector, self.line)?;

        let mut table = Vec::with_capacity(self.cases.len());
        for arm in &self.cases {
            let label = rt.eval_expr(scope, &arm.label, arm.line)?;
            if table.iter().any(|(value, _)| values_equal(value, &label)) {
                return Err(BasicError::DuplicateCase {
                    label: label.to_string(),
                    line: arm.line,
                });
            }
            table.push((label, &arm.body));
        }

        for (label, body) in &table {
            if values_equal(label, &selector) {
                return rt.execute(scope, body);
            }
        }

        if let Some(default) = &self.default {
            return rt.execute(scope, default);
        }
        Ok(())
    }
}

// ─────────────────────────── statement helpers ───────────────────────────

fn split_keyword(text: &str) -> (Option<Keyword>, &str) {
    let end = text
        .find(|c: char| c.is_whitespace())
        .unwrap_or(text.len());
    let (head, rest) = text.split_at(end);

    match KEYWORDS.get(canon(head).as_str()) {
        Some(kw) => (Some(*kw), rest.trim_start()),
        None => (None, text),
    }
}

fn keyword_text(kw: Keyword) -> &'static str {
    match kw {
        Keyword::If => "IF",
        Keyword::Else => "ELSE",
        Keyword::EndIf => "ENDIF",
        Keyword::While => "WHILE",
        Keyword::EndWhile => "ENDWHILE",
        Keyword::Do => "DO",
        Keyword::Loop => "LOOP",
        Keyword::Select => "SELECT",
        Keyword::Case => "CASE",
        Keyword::Default => "DEFAULT",
        Keyword::EndSelect => "ENDSELECT",
        Keyword::Function => "FUNCTION",
        Keyword::EndFunction => "ENDFUNCTION",
        Keyword::Class => "CLASS",
        Keyword::EndClass => "ENDCLASS",
        Keyword::Let => "LET",
        Keyword::Const => "CONST",
        Keyword::Print => "PRINT",
        Keyword::Break => "BREAK",
        Keyword::Exit => "EXIT",
        Keyword::Return => "RETURN",
        Keyword::Raise => "RAISE",
        Keyword::Rem => "REM",
    }
}

fn require_empty(rest: &str, keyword: &str, line: usize) -> Result<()> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(BasicError::parse(
            line,
            format!("Unexpected text after {}", keyword),
        ))
    }
}

/// Strip the trailing THEN word from an IF header, leaving the condition.
fn strip_then(rest: &str, line: usize) -> Result<String> {
    let rest = rest.trim_end();
    let Some(at) = rest.rfind(|c: char| c.is_whitespace()) else {
        return Err(BasicError::parse(line, "Expected THEN".to_string()));
    };
    let (condition, last) = rest.split_at(at);
    if canon(last.trim()) != "THEN" || condition.trim().is_empty() {
        return Err(BasicError::parse(line, "Expected THEN".to_string()));
    }
    Ok(condition.trim().to_string())
}

/// Locate the byte offset of a top-level assignment `=`, skipping quoted
/// strings, bracketed groups, and the two-character comparison operators.
fn find_assignment(text: &str, line: usize) -> Result<Option<usize>> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i, line)?;
                continue;
            }
            b'=' if depth == 0 => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1);
                let comparison = matches!(prev, Some(b'=' | b'<' | b'>' | b'!' | b'~'))
                    || matches!(next, Some(b'=' | b'<' | b'>'));
                if !comparison {
                    return Ok(Some(i));
                }
                // Skip the whole comparison run.
                if next == Some(&b'=') {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    Ok(None)
}

/// Parse `target = expression` when the line contains a top-level `=`.
/// Returns `None` when there is no assignment, or when the left side is
/// not an lvalue, leaving the line to be treated as a bare expression
/// statement (`1 = 1` is an equality test, not an error).
fn parse_assignment(text: &str, line: usize) -> Result<Option<Node>> {
    let Some(at) = find_assignment(text, line)? else {
        return Ok(None);
    };

    let Some(target) = parse_target(&text[..at], line)? else {
        return Ok(None);
    };
    let expr = text[at + 1..].trim().to_string();
    if expr.is_empty() {
        return Err(BasicError::parse(
            line,
            "Assignment requires an expression".to_string(),
        ));
    }

    Ok(Some(Node::Assign { target, expr, line }))
}

fn parse_target(text: &str, line: usize) -> Result<Option<AssignTarget>> {
    let mut scanner = Scanner::new(text.trim(), line);

    let Some((name, indices)) = scanner.try_variable()? else {
        return Ok(None);
    };

    if scanner.is_at_end() {
        return Ok(Some(if indices.is_empty() {
            AssignTarget::Variable { name }
        } else {
            AssignTarget::Element { name, indices }
        }));
    }

    // Member target: `obj$.field$`, no indices on either side.
    if indices.is_empty() && scanner.rest().starts_with('.') {
        let mut field_scanner = Scanner::new(&scanner.rest()[1..], line);
        if let Some((field, field_indices)) = field_scanner.try_variable()? {
            if field_indices.is_empty() && field_scanner.is_at_end() {
                return Ok(Some(AssignTarget::Member {
                    object: name,
                    field,
                }));
            }
        }
    }

    Ok(None)
}

/// A constant's name: a plain sigiled variable with no indices.
fn parse_bare_variable(text: &str, line: usize) -> Result<String> {
    let mut scanner = Scanner::new(text.trim(), line);
    match scanner.try_variable()? {
        Some((name, indices)) if indices.is_empty() && scanner.is_at_end() => Ok(name),
        _ => Err(BasicError::parse(
            line,
            format!("Invalid constant name '{}'", text.trim()),
        )),
    }
}

/// Parse a FUNCTION header: `name(p1$, p2$)`.  The parameter list may be
/// omitted entirely for a niladic function.  Parameter sigils are stripped
/// so the stored names match how variable references resolve.
fn parse_signature(rest: &str, line: usize) -> Result<(String, Vec<String>)> {
    let rest = rest.trim();
    let open = rest.find('(');

    let name = open.map_or(rest, |at| &rest[..at]).trim();
    check_identifier(name, line)?;

    let Some(open) = open else {
        return Ok((name.to_string(), Vec::new()));
    };

    let inner = rest[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| BasicError::parse(line, "Unterminated parameter list".to_string()))?;

    let mut params = Vec::new();
    for piece in inner.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            if inner.trim().is_empty() && params.is_empty() {
                break;
            }
            return Err(BasicError::parse(line, "Empty parameter name".to_string()));
        }
        let bare = piece.strip_suffix('$').unwrap_or(piece);
        check_identifier(bare, line)?;
        params.push(bare.to_string());
    }

    Ok((name.to_string(), params))
}

fn check_identifier(name: &str, line: usize) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(BasicError::parse(line, format!("Invalid name '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Node> {
        parse_program(src).unwrap()
    }

    #[test]
    fn assignment_line_parses_to_variable_target() {
        let nodes = parse("x$ = 1 + 2");
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::Assign {
                target: AssignTarget::Variable { name },
                expr,
                ..
            } => {
                assert_eq!(name, "x");
                assert_eq!(expr, "1 + 2");
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn element_and_member_targets() {
        let nodes = parse("a$[0][i$ + 1] = 5\np$.age$ = 40");
        match &nodes[0] {
            Node::Assign {
                target: AssignTarget::Element { name, indices },
                ..
            } => {
                assert_eq!(name, "a");
                assert_eq!(indices, &["0", "i$ + 1"]);
            }
            other => panic!("unexpected node {:?}", other),
        }
        match &nodes[1] {
            Node::Assign {
                target: AssignTarget::Member { object, field },
                ..
            } => {
                assert_eq!(object, "p");
                assert_eq!(field, "age");
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn comparison_lines_are_expressions_not_assignments() {
        for src in ["x$ == 1", "x$ <= 1", "x$ >= 1", "x$ <> 1", "x$ =< 1", "x$ => 1", "x$ ~= 1"] {
            let nodes = parse(src);
            assert!(
                matches!(nodes[0], Node::Expr { .. }),
                "expected expression for {:?}",
                src
            );
        }

        // A single `=` whose left side is not an lvalue is an equality
        // test, not a broken assignment.
        for src in ["1 = 1", "x$ + 1 = 2", "len(a$) = 3"] {
            let nodes = parse(src);
            assert!(
                matches!(nodes[0], Node::Expr { .. }),
                "expected expression for {:?}",
                src
            );
        }
    }

    #[test]
    fn if_else_nesting_attaches_else_to_inner_if() {
        let src = "IF a$ THEN\nIF b$ THEN\nPRINT 1\nELSE\nPRINT 2\nENDIF\nENDIF";
        let nodes = parse(src);
        let Node::If(outer) = &nodes[0] else {
            panic!("expected IF");
        };
        assert!(outer.else_body.is_empty());
        let Node::If(inner) = &outer.then_body[0] else {
            panic!("expected nested IF");
        };
        assert_eq!(inner.else_body.len(), 1);
    }

    #[test]
    fn unterminated_while_reports_opener_line() {
        let err = parse_program("x$ = 0\nWHILE x$ < 3\nx$ = x$ + 1").unwrap_err();
        match err {
            BasicError::UnterminatedBlock { keyword, line } => {
                assert_eq!(keyword, "WHILE");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn loop_until_rewrites_to_while_form() {
        let nodes = parse("DO\nx$ = x$ + 1\nLOOP UNTIL x$ >= 3");
        let Node::Do(block) = &nodes[0] else {
            panic!("expected DO");
        };
        assert_eq!(block.condition, "NOT (x$ >= 3)");
    }

    #[test]
    fn duplicate_case_label_text_is_fatal_at_parse() {
        let src = "SELECT x$\nCASE 1\nPRINT 1\nCASE 1\nPRINT 2\nENDSELECT";
        let err = parse_program(src).unwrap_err();
        assert!(matches!(err, BasicError::DuplicateCase { .. }));
    }

    #[test]
    fn function_signature_strips_param_sigils() {
        let nodes = parse("FUNCTION add(a$, b$)\nRETURN a$ + b$\nENDFUNCTION");
        let Node::FunctionDef(def) = &nodes[0] else {
            panic!("expected FUNCTION");
        };
        assert_eq!(def.name, "add");
        assert_eq!(def.params, vec!["a", "b"]);
        assert_eq!(def.body.len(), 1);
    }

    #[test]
    fn class_body_partitions_methods_from_initializers() {
        let src = "CLASS Dog EXTENDS Animal\nlegs$ = 4\nFUNCTION speak()\nRETURN \"woof\"\nENDFUNCTION\nENDCLASS";
        let nodes = parse(src);
        let Node::ClassDef(def) = &nodes[0] else {
            panic!("expected CLASS");
        };
        assert_eq!(def.name, "Dog");
        assert_eq!(def.parent.as_deref(), Some("Animal"));
        assert_eq!(def.initializers.len(), 1);
        assert_eq!(def.methods.len(), 1);
        assert_eq!(def.methods[0].name, "speak");
    }

    #[test]
    fn stray_closer_is_a_parse_error() {
        assert!(parse_program("ENDIF").is_err());
        assert!(parse_program("ELSE").is_err());
    }

    #[test]
    fn rem_and_blank_lines_are_skipped() {
        let nodes = parse("\nREM a comment\n\nPRINT 1\n");
        assert_eq!(nodes.len(), 1);
    }
}
