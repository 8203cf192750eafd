//! The `scshell` command interpreter.
//!
//! Reads commands line by line, builds graphs, configures the solver, runs
//! solves and mining passes, and checks accumulated result counts with
//! `expect`. Parse and build problems are reported to stderr and processing
//! continues; an `expect` mismatch aborts with a dedicated error so the
//! binary can exit nonzero.

use std::io::{BufRead, Write};

use thiserror::Error;

use subcirc_subgraph::{GraphBuilder, Match, MineOptions, MineResult, SolveOptions, Solver};

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("expected {expected} results, got {actual}")]
    ExpectMismatch { expected: usize, actual: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Shell {
    solver: Solver,
    matches: Vec<Match>,
    mined: Vec<MineResult>,
    /// Pending `initmap` entries; consumed by the next solve.
    init_mappings: Vec<(String, Vec<String>)>,
    building: Option<(String, GraphBuilder)>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    #[must_use]
    pub fn new() -> Self {
        Shell {
            solver: Solver::new(),
            matches: Vec::new(),
            mined: Vec::new(),
            init_mappings: Vec::new(),
            building: None,
        }
    }

    /// Enables per-step trace output, like the `verbose` command.
    pub fn set_verbose(&mut self) {
        self.solver.set_verbose();
    }

    /// Runs every command from `input`, writing reports to `out`.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<(), ShellError> {
        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() || tokens[0].starts_with('#') {
                continue;
            }
            match self.execute(&tokens, out) {
                Ok(()) => {}
                Err(CommandError::Fatal(err)) => return Err(err),
                Err(CommandError::Recoverable(reason)) => {
                    let err = ShellError::Parse {
                        line: line_no,
                        reason,
                    };
                    eprintln!("{err}");
                }
            }
        }
        Ok(())
    }

    fn execute<W: Write>(&mut self, tokens: &[&str], out: &mut W) -> Result<(), CommandError> {
        if self.building.is_some() {
            return self.execute_graph_command(tokens);
        }
        match tokens[0] {
            "graph" => {
                let [name] = expect_args(tokens)?;
                self.building = Some((name.to_owned(), GraphBuilder::new()));
                Ok(())
            }
            "compatible" => {
                let [needle_ty, haystack_ty] = expect_args(tokens)?;
                self.solver.add_compatible_types(needle_ty, haystack_ty);
                Ok(())
            }
            "constcompat" => {
                let [needle, haystack] = expect_args(tokens)?;
                self.solver
                    .add_compatible_constants(parse_char(needle)?, parse_char(haystack)?);
                Ok(())
            }
            "swapgroup" => {
                if tokens.len() < 4 {
                    return Err(recoverable("swapgroup needs a type and at least two ports"));
                }
                self.solver
                    .add_swappable_ports(tokens[1], &tokens[2..])
                    .map_err(|e| recoverable(e.to_string()))
            }
            "swapperm" => self.cmd_swapperm(tokens),
            "initmap" => {
                if tokens.len() < 3 {
                    return Err(recoverable(
                        "initmap needs a needle node and at least one haystack node",
                    ));
                }
                self.init_mappings.push((
                    tokens[1].to_owned(),
                    tokens[2..].iter().map(|s| (*s).to_owned()).collect(),
                ));
                Ok(())
            }
            "solve" => self.cmd_solve(tokens),
            "mine" => self.cmd_mine(tokens),
            "expect" => self.cmd_expect(tokens, out),
            "clearoverlap" => {
                expect_args::<0>(tokens)?;
                self.solver.clear_overlap_history();
                Ok(())
            }
            "clearconfig" => {
                expect_args::<0>(tokens)?;
                self.solver.clear_config();
                Ok(())
            }
            "verbose" => {
                expect_args::<0>(tokens)?;
                self.solver.set_verbose();
                Ok(())
            }
            other => Err(recoverable(format!("unknown command '{other}'"))),
        }
    }

    fn execute_graph_command(&mut self, tokens: &[&str]) -> Result<(), CommandError> {
        match tokens[0] {
            "node" => {
                if tokens.len() < 2 + 1 + 2 {
                    return Err(recoverable(
                        "node needs a name, a type and at least one port",
                    ));
                }
                let builder = self.builder()?;
                builder
                    .create_node(tokens[1], tokens[2])
                    .map_err(|e| recoverable(e.to_string()))?;
                let mut rest = &tokens[3..];
                while !rest.is_empty() {
                    if rest.len() < 2 {
                        return Err(recoverable("dangling port declaration"));
                    }
                    let port = rest[0];
                    let width = parse_usize(rest[1])?;
                    let (min_width, consumed) = match rest.get(2).map(|t| t.parse::<usize>()) {
                        Some(Ok(min)) => (min, 3),
                        _ => (width, 2),
                    };
                    self.builder()?
                        .create_port_min(tokens[1], port, width, min_width)
                        .map_err(|e| recoverable(e.to_string()))?;
                    rest = &rest[consumed..];
                }
                Ok(())
            }
            "connect" => {
                let builder = self.builder()?;
                match tokens.len() {
                    5 => builder
                        .create_connection(tokens[1], tokens[2], tokens[3], tokens[4])
                        .map_err(|e| recoverable(e.to_string())),
                    7 | 8 => {
                        let from_bit = parse_usize(tokens[3])?;
                        let to_bit = parse_usize(tokens[6])?;
                        let width = match tokens.get(7) {
                            Some(tok) => parse_usize(tok)?,
                            None => 1,
                        };
                        self.builder()?
                            .create_connection_range(
                                tokens[1], tokens[2], from_bit, tokens[4], tokens[5], to_bit,
                                width,
                            )
                            .map_err(|e| recoverable(e.to_string()))
                    }
                    _ => Err(recoverable("connect takes 4 or 6..7 arguments")),
                }
            }
            "constant" => {
                let builder = self.builder()?;
                match tokens.len() {
                    4 => {
                        let value = parse_u64(tokens[3])?;
                        builder
                            .create_constant(tokens[1], tokens[2], value)
                            .map_err(|e| recoverable(e.to_string()))
                    }
                    5 => {
                        let bit = parse_usize(tokens[3])?;
                        let value = parse_char(tokens[4])?;
                        builder
                            .create_constant_bit(tokens[1], tokens[2], bit, value)
                            .map_err(|e| recoverable(e.to_string()))
                    }
                    _ => Err(recoverable("constant takes 3 or 4 arguments")),
                }
            }
            "extern" => {
                if tokens.len() < 3 {
                    return Err(recoverable("extern needs a node and at least one port"));
                }
                let node = tokens[1];
                let mut rest = &tokens[2..];
                while !rest.is_empty() {
                    let port = rest[0];
                    match rest.get(1).map(|t| t.parse::<usize>()) {
                        Some(Ok(bit)) => {
                            self.builder()?
                                .mark_extern_bit(node, port, bit)
                                .map_err(|e| recoverable(e.to_string()))?;
                            rest = &rest[2..];
                        }
                        _ => {
                            self.builder()?
                                .mark_extern(node, port)
                                .map_err(|e| recoverable(e.to_string()))?;
                            rest = &rest[1..];
                        }
                    }
                }
                Ok(())
            }
            "allextern" => {
                expect_args::<0>(tokens)?;
                self.builder()?.mark_all_extern();
                Ok(())
            }
            "endgraph" => {
                expect_args::<0>(tokens)?;
                let (name, builder) = self.building.take().expect("inside a graph block");
                self.solver
                    .add_graph(&name, builder.freeze())
                    .map_err(|e| recoverable(e.to_string()))
            }
            other => Err(recoverable(format!(
                "unknown command '{other}' inside graph block"
            ))),
        }
    }

    fn cmd_swapperm(&mut self, tokens: &[&str]) -> Result<(), CommandError> {
        let Some(colon) = tokens.iter().position(|t| *t == ":") else {
            return Err(recoverable("swapperm needs a ':' separator"));
        };
        if colon < 2 {
            return Err(recoverable("swapperm needs a type before the port lists"));
        }
        let lhs = &tokens[2..colon];
        let rhs = &tokens[colon + 1..];
        if lhs.is_empty() || lhs.len() != rhs.len() {
            return Err(recoverable(
                "swapperm needs equally long port lists around ':'",
            ));
        }
        let pairs: Vec<(&str, &str)> = lhs.iter().copied().zip(rhs.iter().copied()).collect();
        self.solver
            .add_swappable_ports_permutation(tokens[1], &pairs)
            .map_err(|e| recoverable(e.to_string()))
    }

    fn cmd_solve(&mut self, tokens: &[&str]) -> Result<(), CommandError> {
        if !(3..=5).contains(&tokens.len()) {
            return Err(recoverable("solve takes 2 to 4 arguments"));
        }
        let allow_overlap = match tokens.get(3) {
            Some(tok) => parse_bool(tok)?,
            None => true,
        };
        let max_solutions = match tokens.get(4) {
            Some(tok) => {
                let value: i64 = tok
                    .parse()
                    .map_err(|_| recoverable(format!("bad max_solutions '{tok}'")))?;
                usize::try_from(value).ok()
            }
            None => None,
        };
        let options = SolveOptions {
            allow_overlap,
            max_solutions,
            initial_mappings: std::mem::take(&mut self.init_mappings),
        };
        self.solver
            .solve_with(&mut self.matches, tokens[1], tokens[2], &options)
            .map_err(|e| recoverable(e.to_string()))?;
        Ok(())
    }

    fn cmd_mine(&mut self, tokens: &[&str]) -> Result<(), CommandError> {
        if !(4..=5).contains(&tokens.len()) {
            return Err(recoverable("mine takes 3 or 4 arguments"));
        }
        let options = MineOptions {
            min_nodes: parse_usize(tokens[1])?,
            max_nodes: parse_usize(tokens[2])?,
            min_matches: parse_usize(tokens[3])?,
            per_graph_cap: match tokens.get(4) {
                Some(tok) => Some(parse_usize(tok)?),
                None => None,
            },
        };
        self.solver.mine(&mut self.mined, &options);
        Ok(())
    }

    fn cmd_expect<W: Write>(&mut self, tokens: &[&str], out: &mut W) -> Result<(), CommandError> {
        let [count] = expect_args(tokens)?;
        let expected = parse_usize(count)?;
        for (idx, m) in self.matches.iter().enumerate() {
            write!(out, "{}", m.render(idx + 1)).map_err(fatal_io)?;
        }
        for (idx, m) in self.mined.iter().enumerate() {
            write!(out, "{}", m.render(idx + 1)).map_err(fatal_io)?;
        }
        let actual = self.matches.len() + self.mined.len();
        writeln!(out, "Found {actual} results.").map_err(fatal_io)?;
        if actual != expected {
            return Err(CommandError::Fatal(ShellError::ExpectMismatch {
                expected,
                actual,
            }));
        }
        self.matches.clear();
        self.mined.clear();
        Ok(())
    }

    fn builder(&mut self) -> Result<&mut GraphBuilder, CommandError> {
        match self.building.as_mut() {
            Some((_, builder)) => Ok(builder),
            None => Err(recoverable("command only valid inside a graph block")),
        }
    }
}

enum CommandError {
    /// Reported and skipped; the shell keeps reading.
    Recoverable(String),
    /// Aborts the run.
    Fatal(ShellError),
}

fn recoverable(reason: impl Into<String>) -> CommandError {
    CommandError::Recoverable(reason.into())
}

fn fatal_io(err: std::io::Error) -> CommandError {
    CommandError::Fatal(ShellError::Io(err))
}

fn expect_args<'a, const N: usize>(tokens: &[&'a str]) -> Result<[&'a str; N], CommandError> {
    if tokens.len() != N + 1 {
        return Err(recoverable(format!(
            "'{}' takes {N} argument(s)",
            tokens[0]
        )));
    }
    let mut out = [""; N];
    out.copy_from_slice(&tokens[1..]);
    Ok(out)
}

fn parse_usize(token: &str) -> Result<usize, CommandError> {
    token
        .parse()
        .map_err(|_| recoverable(format!("bad number '{token}'")))
}

fn parse_u64(token: &str) -> Result<u64, CommandError> {
    token
        .parse()
        .map_err(|_| recoverable(format!("bad number '{token}'")))
}

fn parse_char(token: &str) -> Result<char, CommandError> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(recoverable(format!("bad constant '{token}'"))),
    }
}

fn parse_bool(token: &str) -> Result<bool, CommandError> {
    match token {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(recoverable(format!("bad boolean '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    fn run_script(script: &str) -> (Result<(), ShellError>, String) {
        let mut shell = Shell::new();
        let mut out = Vec::new();
        let result = shell.run(Cursor::new(script), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    const MACC_GRAPHS: &str = "\
graph macc22
  node mul_a mul A 4 B 4 Y 4
  node mul_b mul A 4 B 4 Y 4
  node add_1 add A 4 B 4 Y 4
  connect mul_a Y add_1 A
  connect mul_b Y add_1 B
  extern mul_a A B
  extern mul_b A B
  extern add_1 Y
endgraph
graph macc4x2
  node mul_1 mul A 4 B 4 Y 4
  node mul_2 mul A 4 B 4 Y 4
  node mul_3 mul A 4 B 4 Y 4
  node mul_4 mul A 4 B 4 Y 4
  node add_1 add A 4 B 4 Y 4
  node add_2 add A 4 B 4 Y 4
  node add_3 add A 4 B 4 Y 4
  connect mul_1 Y add_1 A
  connect mul_2 Y add_1 B
  connect mul_3 Y add_2 A
  connect mul_4 Y add_2 B
  connect add_1 Y add_3 A
  connect add_2 Y add_3 B
  extern mul_1 A B
  extern mul_2 A B
  extern mul_3 A B
  extern mul_4 A B
  extern add_3 Y
endgraph
";

    const CROSSED_GRAPHS: &str = "\
graph mixed22
  node mul_a mul A 4 B 4 Y 4
  node sub_b sub A 4 B 4 Y 4
  node add_1 add A 4 B 4 Y 4
  connect mul_a Y add_1 A
  connect sub_b Y add_1 B
  extern mul_a A B
  extern sub_b A B
  extern add_1 Y
endgraph
graph crossed2x2
  node mul_1 mul A 4 B 4 Y 4
  node sub_1 sub A 4 B 4 Y 4
  node mul_2 mul A 4 B 4 Y 4
  node sub_2 sub A 4 B 4 Y 4
  node add_1 add A 4 B 4 Y 4
  node add_2 add A 4 B 4 Y 4
  connect mul_1 Y add_1 A
  connect sub_1 Y add_1 B
  connect sub_2 Y add_2 A
  connect mul_2 Y add_2 B
  extern mul_1 A B
  extern sub_1 A B
  extern mul_2 A B
  extern sub_2 A B
  extern add_1 Y
  extern add_2 Y
endgraph
";

    #[test]
    fn macc_script_end_to_end() {
        let script = format!(
            "{CROSSED_GRAPHS}\
solve mixed22 crossed2x2
expect 1
swapgroup add A B
solve mixed22 crossed2x2
expect 2
"
        );
        let (result, out) = run_script(&script);
        assert!(result.is_ok(), "{result:?}");
        assert!(out.contains("Match #1: (mixed22 in crossed2x2)"));
        assert!(out.contains("A:B"));
        assert!(out.contains("Found 2 results."));
    }

    #[test]
    fn expect_mismatch_aborts() {
        let script = format!(
            "{MACC_GRAPHS}\
solve macc22 macc4x2
expect 3
"
        );
        let (result, _) = run_script(&script);
        match result {
            Err(ShellError::ExpectMismatch { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn expect_clears_the_buffer() {
        let script = format!(
            "{MACC_GRAPHS}\
solve macc22 macc4x2
expect 2
solve macc22 macc4x2
expect 2
"
        );
        let (result, out) = run_script(&script);
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(out.matches("Found 2 results.").count(), 2);
    }

    #[test]
    fn initmap_is_consumed_by_next_solve() {
        let script = format!(
            "{MACC_GRAPHS}\
initmap add_1 add_2
solve macc22 macc4x2
expect 1
solve macc22 macc4x2
expect 2
"
        );
        let (result, _) = run_script(&script);
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn solve_arguments_control_overlap_and_cap() {
        let script = format!(
            "{MACC_GRAPHS}\
solve macc22 macc4x2 true 1
expect 1
solve macc22 macc4x2 0
expect 2
solve macc22 macc4x2 0
expect 0
clearoverlap
solve macc22 macc4x2 0 -1
expect 2
"
        );
        let (result, _) = run_script(&script);
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn mine_reports_recurring_patterns() {
        let script = "\
graph g1
  node a1 t1 Y 1
  node b1 t2 A 1
  connect a1 Y b1 A
  node a2 t1 Y 1
  node b2 t2 A 1
  connect a2 Y b2 A
endgraph
mine 2 2 2
expect 1
";
        let (result, out) = run_script(script);
        assert!(result.is_ok(), "{result:?}");
        assert!(out.contains("Mined #1: 2 nodes, 2 matches (g1=2)"));
    }

    #[test]
    fn constants_and_constcompat() {
        let script = "\
graph needle
  node n cfg V 1
  constant n V 0 x
endgraph
graph haystack
  node m cfg V 1
  constant m V 0
endgraph
solve needle haystack
expect 0
constcompat x 0
solve needle haystack
expect 1
";
        let (result, _) = run_script(script);
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn parse_errors_do_not_abort() {
        let script = "\
bogus command
graph g
  node a t Y 1
endgraph
solve g g
expect 1
";
        let (result, _) = run_script(script);
        assert!(result.is_ok(), "{result:?}");
    }

    #[rstest]
    #[case("swapgroup add A")]
    #[case("swapperm add A B")]
    #[case("swapperm add A B : C")]
    #[case("solve onlyone")]
    #[case("mine 1")]
    #[case("constant nowhere")]
    fn malformed_commands_are_recoverable(#[case] line: &str) {
        let script = format!("{line}\n");
        let (result, _) = run_script(&script);
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn node_min_width_is_parsed() {
        let script = "\
graph wide
  node a add A 32 1 B 32 1 Y 32 1
endgraph
graph narrow
  node x add A 16 B 16 Y 16
endgraph
solve wide narrow
expect 1
";
        let (result, _) = run_script(script);
        assert!(result.is_ok(), "{result:?}");
    }
}
