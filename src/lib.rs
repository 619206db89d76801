//! Thompson NFA construction and backtracking-free simulation.
//!
//! Based on Russ Cox's article <https://swtch.com/~rsc/regexp/regexp1.html>
//! (Thompson NFA construction and simulation).
//!
//! # Dialect
//!
//! Patterns are byte strings.  Five bytes are structural: `|` (alternation),
//! `(` `)` (grouping) and the postfix quantifiers `*`, `+`, `?`.  Every other
//! byte is a literal, except `.` which is reserved as the explicit
//! concatenation token of the postfix form.  A regex matches a haystack only
//! if it matches the **whole** haystack; there is no search mode.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! pattern ──translate──>  Postfix  ──next_fragment──>  NFA states  ──Matcher──>  bool
//!                            ^
//! regex_syntax::hir::Hir ────┘ (Postfix::from_hir)
//! ```
//!
//! ## Translation
//!
//! [`RegexBuilder::translate`] rewrites the infix pattern into postfix order
//! with a pair of counters per nesting level: `natom`, the operands pending
//! concatenation, and `nalt`, the alternation branches already closed.
//! Opening a group saves both counters; closing it emits the pending `.` and
//! `|` tokens and counts the group as one operand of the outer level.  No
//! parse tree is built.
//!
//! ## Construction
//!
//! [`RegexBuilder::build_postfix`] runs the postfix stream as a stack
//! machine over fragments.  A fragment is an entry state plus a
//! patch list of outgoing edges that are not wired yet.  The edges are
//! recorded as explicit `(state, edge)` slots rather than threaded through
//! the unset pointers themselves, so an unpatched edge is never confused
//! with a real transition.  States live in one arena; index 0 is always
//! the `Match` state.
//!
//! ## Simulation
//!
//! [`Matcher`] keeps the set of `Byte` states (plus possibly `Match`)
//! reachable after the prefix consumed so far.  `Split` states are expanded
//! on insertion and never stored.  Every state is stamped with the id of
//! the list it was last added to, which both de-duplicates the set and
//! guarantees termination on epsilon cycles such as `(a*)*`.  Each input
//! byte costs work proportional to the number of live states, so matching
//! is linear in the haystack length.

use std::fmt;
use std::io::{self, Write};
use std::ops::{Index, IndexMut};

use log::{debug, trace};
use regex_syntax::hir::{self, HirKind};
use thiserror::Error;

/// Re-export so users do not need a direct `regex-syntax` dependency.
pub use regex_syntax::hir::Hir;

/// Default maximum group nesting depth accepted by the translator.
pub const DEFAULT_NEST_LIMIT: usize = 250;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error returned while translating or building a regex.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The infix pattern is malformed.
    #[error("invalid pattern at offset {offset}: {kind}")]
    InvalidPattern {
        /// Byte offset in the pattern where the problem was detected.
        offset: usize,
        kind: PatternErrorKind,
    },

    /// The postfix stream does not describe exactly one expression.
    ///
    /// A stream produced by the translator never triggers this; it signals
    /// a hand-written stream or a broken invariant.
    #[error("malformed postfix at token {position}: {kind}")]
    MalformedPostfix {
        /// Index of the offending token (the stream length for end-of-stream
        /// checks).
        position: usize,
        kind: PostfixErrorKind,
    },

    /// The automaton would need more states than the configured limit.
    #[error("automaton exceeds the size limit of {limit} states")]
    SizeLimitExceeded { limit: usize },

    /// A character class that contains non-ASCII codepoints, or no bytes
    /// at all.
    #[error("unsupported character class: {0:?}")]
    UnsupportedClass(hir::Class),

    /// Look-around assertions have no counterpart; matching is always
    /// anchored at both ends.
    #[error("unsupported look-around assertion: {0:?}")]
    UnsupportedLook(hir::Look),

    /// An empty sub-expression (e.g. `a|` or `x{0}`).
    #[error("empty sub-expressions are not supported")]
    UnsupportedEmpty,

    /// A literal byte that spells a postfix operator (`.` `|` `*` `+` `?`).
    #[error("literal `{0}` is reserved for postfix operators")]
    ReservedLiteral(char),
}

/// What is wrong with an infix pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PatternErrorKind {
    #[error("unclosed group")]
    UnclosedGroup,
    #[error("unopened group")]
    UnopenedGroup,
    #[error("`{0}` has no operand")]
    MissingOperand(char),
    #[error("empty group")]
    EmptyGroup,
    #[error("empty alternative")]
    EmptyAlternative,
    #[error("empty pattern")]
    EmptyPattern,
    #[error("`.` is reserved for concatenation")]
    ReservedDot,
    #[error("groups nested deeper than {0}")]
    NestLimitExceeded(usize),
}

/// What is wrong with a postfix stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PostfixErrorKind {
    #[error("`{0}` needs more operands than the stack holds")]
    StackUnderflow(char),
    #[error("{0} fragments left on the stack, expected 1")]
    LeftoverFragments(usize),
}

// ---------------------------------------------------------------------------
// Postfix token stream
// ---------------------------------------------------------------------------

/// One token of a postfix regex, consumed by
/// [`RegexBuilder::build_postfix`] to emit NFA states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostfixNode {
    Byte(u8),
    /// `.`
    Catenate,
    /// `|`
    Alternate,
    /// `*`
    RepeatZeroPlus,
    /// `+`
    RepeatOnePlus,
    /// `?`
    RepeatZeroOne,
}

impl PostfixNode {
    /// The byte spelling this node in the textual postfix form.
    pub fn as_byte(self) -> u8 {
        match self {
            PostfixNode::Byte(b) => b,
            PostfixNode::Catenate => b'.',
            PostfixNode::Alternate => b'|',
            PostfixNode::RepeatZeroPlus => b'*',
            PostfixNode::RepeatOnePlus => b'+',
            PostfixNode::RepeatZeroOne => b'?',
        }
    }

    /// Whether `b` spells an operator rather than a literal.
    fn is_operator(b: u8) -> bool {
        !matches!(PostfixNode::from_byte(b), PostfixNode::Byte(_))
    }

    fn from_byte(b: u8) -> Self {
        match b {
            b'.' => PostfixNode::Catenate,
            b'|' => PostfixNode::Alternate,
            b'*' => PostfixNode::RepeatZeroPlus,
            b'+' => PostfixNode::RepeatOnePlus,
            b'?' => PostfixNode::RepeatZeroOne,
            b => PostfixNode::Byte(b),
        }
    }
}

/// A regex in postfix (reverse Polish) order.
///
/// The textual form uses the literal bytes plus `.` `|` `*` `+` `?`, so
/// `a(b|c)` becomes `abc|.`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Postfix(Vec<PostfixNode>);

impl Postfix {
    /// Read the textual postfix form.
    ///
    /// Any byte other than the five operators is a literal.  No structural
    /// check is done here; [`RegexBuilder::build_postfix`] reports streams
    /// with too few or too many operands.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Postfix(bytes.iter().copied().map(PostfixNode::from_byte).collect())
    }

    pub fn nodes(&self) -> &[PostfixNode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The textual postfix form as raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().map(|node| node.as_byte()).collect()
    }
}

/// Printable ASCII is written as-is, anything else as `\xNN`.
impl fmt::Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.0 {
            let b = node.as_byte();
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Infix -> postfix translation
// ---------------------------------------------------------------------------

/// Pending counts for one group nesting level.
#[derive(Clone, Copy, Debug, Default)]
struct Level {
    /// Operands waiting to be concatenated.  Never exceeds 2: a third
    /// operand first folds the previous two.
    natom: usize,
    /// Alternation branches closed so far.
    nalt: usize,
}

impl Level {
    /// Fold the two pending operands into one, if there are two.
    fn fold_pair(&mut self, out: &mut Vec<PostfixNode>) {
        if self.natom > 1 {
            self.natom -= 1;
            out.push(PostfixNode::Catenate);
        }
    }

    /// Fold every pending operand into one finished branch.  Requires at
    /// least one pending operand.
    fn close_branch(&mut self, out: &mut Vec<PostfixNode>) {
        debug_assert!(self.natom > 0);
        while self.natom > 1 {
            self.natom -= 1;
            out.push(PostfixNode::Catenate);
        }
        self.natom = 0;
    }

    /// Join the finished branch with every branch closed before it.
    fn close_alternation(&mut self, out: &mut Vec<PostfixNode>) {
        out.extend(std::iter::repeat_n(PostfixNode::Alternate, self.nalt));
        self.nalt = 0;
    }

    /// The error for a branch that ends without any operand.
    fn empty_kind(&self, if_first: PatternErrorKind) -> PatternErrorKind {
        if self.nalt == 0 {
            if_first
        } else {
            PatternErrorKind::EmptyAlternative
        }
    }
}

/// A `(` whose body is being translated.
#[derive(Debug)]
struct OpenGroup {
    outer: Level,
    offset: usize,
}

fn translate(pattern: &[u8], nest_limit: usize) -> Result<Postfix, Error> {
    let invalid = |offset, kind| Error::InvalidPattern { offset, kind };

    let mut out = Vec::with_capacity(pattern.len() * 2);
    let mut level = Level::default();
    let mut groups: Vec<OpenGroup> = Vec::new();

    for (offset, &b) in pattern.iter().enumerate() {
        match b {
            b'(' => {
                level.fold_pair(&mut out);
                if groups.len() >= nest_limit {
                    return Err(invalid(
                        offset,
                        PatternErrorKind::NestLimitExceeded(nest_limit),
                    ));
                }
                groups.push(OpenGroup {
                    outer: level,
                    offset,
                });
                level = Level::default();
            }
            b'|' => {
                if level.natom == 0 {
                    return Err(invalid(
                        offset,
                        level.empty_kind(PatternErrorKind::MissingOperand('|')),
                    ));
                }
                level.close_branch(&mut out);
                level.nalt += 1;
            }
            b')' => {
                let Some(group) = groups.pop() else {
                    return Err(invalid(offset, PatternErrorKind::UnopenedGroup));
                };
                if level.natom == 0 {
                    return Err(invalid(
                        offset,
                        level.empty_kind(PatternErrorKind::EmptyGroup),
                    ));
                }
                level.close_branch(&mut out);
                level.close_alternation(&mut out);
                level = group.outer;
                level.natom += 1;
            }
            b'*' | b'+' | b'?' => {
                if level.natom == 0 {
                    return Err(invalid(offset, PatternErrorKind::MissingOperand(b as char)));
                }
                out.push(PostfixNode::from_byte(b));
            }
            b'.' => return Err(invalid(offset, PatternErrorKind::ReservedDot)),
            _ => {
                level.fold_pair(&mut out);
                out.push(PostfixNode::Byte(b));
                level.natom += 1;
            }
        }
    }

    if let Some(group) = groups.pop() {
        return Err(invalid(group.offset, PatternErrorKind::UnclosedGroup));
    }
    if level.natom == 0 {
        return Err(invalid(
            pattern.len(),
            level.empty_kind(PatternErrorKind::EmptyPattern),
        ));
    }
    level.close_branch(&mut out);
    level.close_alternation(&mut out);

    Ok(Postfix(out))
}

/// Translate an infix pattern to postfix with the default configuration.
///
/// ```
/// let postfix = regex_thompson::to_postfix("a(b|c)").unwrap();
/// assert_eq!(postfix.to_string(), "abc|.");
/// ```
pub fn to_postfix(pattern: impl AsRef<[u8]>) -> Result<Postfix, Error> {
    RegexBuilder::new().translate(pattern)
}

// ---------------------------------------------------------------------------
// regex-syntax HIR -> postfix lowering
// ---------------------------------------------------------------------------

impl Postfix {
    /// Lower a `regex-syntax` HIR into the postfix stream.
    ///
    /// Byte classes become alternations of their member bytes, captures are
    /// plain groups, and counted repetitions are unrolled.  Look-around
    /// assertions and empty sub-expressions are rejected, as are classes
    /// reaching beyond ASCII.  A literal `.`, `|`, `*`, `+` or `?` (for
    /// example `a\.` or `[+-]`) is refused with [`Error::ReservedLiteral`],
    /// so the output always reads back through [`Postfix::from_bytes`].
    pub fn from_hir(hir: &Hir) -> Result<Self, Error> {
        let mut postfix = Postfix::default();
        postfix.lower(hir)?;
        debug!("lowered HIR to postfix `{}`", postfix);
        Ok(postfix)
    }

    fn lower(&mut self, hir: &Hir) -> Result<(), Error> {
        match hir.kind() {
            HirKind::Empty => Err(Error::UnsupportedEmpty),
            HirKind::Literal(hir::Literal(bytes)) => {
                if bytes.is_empty() {
                    return Err(Error::UnsupportedEmpty);
                }
                for (i, &b) in bytes.iter().enumerate() {
                    self.0.push(literal(b)?);
                    if i > 0 {
                        self.0.push(PostfixNode::Catenate);
                    }
                }
                Ok(())
            }
            HirKind::Class(class) => {
                let bytes =
                    class_bytes(class).ok_or_else(|| Error::UnsupportedClass(class.clone()))?;
                for (i, b) in bytes.into_iter().enumerate() {
                    self.0.push(literal(b)?);
                    if i > 0 {
                        self.0.push(PostfixNode::Alternate);
                    }
                }
                Ok(())
            }
            HirKind::Look(look) => Err(Error::UnsupportedLook(*look)),
            HirKind::Repetition(rep) => self.lower_repetition(rep),
            HirKind::Capture(cap) => self.lower(&cap.sub),
            HirKind::Concat(subs) => self.lower_folded(subs, PostfixNode::Catenate),
            HirKind::Alternation(subs) => self.lower_folded(subs, PostfixNode::Alternate),
        }
    }

    /// Lower each sub-expression, joining them left to right with `join`.
    fn lower_folded(&mut self, subs: &[Hir], join: PostfixNode) -> Result<(), Error> {
        if subs.is_empty() {
            return Err(Error::UnsupportedEmpty);
        }
        for (i, sub) in subs.iter().enumerate() {
            self.lower(sub)?;
            if i > 0 {
                self.0.push(join);
            }
        }
        Ok(())
    }

    /// `*`, `+` and `?` map onto a single operator.  `{n,m}` is unrolled
    /// into `n` plain copies followed by `m - n` optional ones, and `{n,}`
    /// into `n - 1` plain copies followed by one `+` copy.
    fn lower_repetition(&mut self, rep: &hir::Repetition) -> Result<(), Error> {
        let start = self.0.len();
        self.lower(&rep.sub)?;
        let body = self.0.split_off(start);

        let min = rep.min as usize;
        let mut copies: Vec<Option<PostfixNode>> = match rep.max {
            None if min == 0 => vec![Some(PostfixNode::RepeatZeroPlus)],
            None => {
                let mut copies = vec![None; min - 1];
                copies.push(Some(PostfixNode::RepeatOnePlus));
                copies
            }
            Some(0) => return Err(Error::UnsupportedEmpty),
            Some(_) => vec![None; min],
        };
        if let Some(max) = rep.max {
            let optional = (max as usize).saturating_sub(min);
            copies.extend(std::iter::repeat_n(Some(PostfixNode::RepeatZeroOne), optional));
        }

        for (i, op) in copies.into_iter().enumerate() {
            self.0.extend_from_slice(&body);
            if let Some(op) = op {
                self.0.push(op);
            }
            if i > 0 {
                self.0.push(PostfixNode::Catenate);
            }
        }
        Ok(())
    }
}

/// A literal node for `b`.  Operator bytes are refused so that the textual
/// form reads back as the same stream.
fn literal(b: u8) -> Result<PostfixNode, Error> {
    if PostfixNode::is_operator(b) {
        return Err(Error::ReservedLiteral(b as char));
    }
    Ok(PostfixNode::Byte(b))
}

/// The member bytes of `class`, or `None` if it has none or needs more
/// than one byte per codepoint.
fn class_bytes(class: &hir::Class) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = match class {
        hir::Class::Bytes(class) => class
            .ranges()
            .iter()
            .flat_map(|range| range.start()..=range.end())
            .collect(),
        hir::Class::Unicode(class) => {
            let mut bytes = Vec::new();
            for range in class.ranges() {
                if !range.end().is_ascii() {
                    return None;
                }
                bytes.extend(range.start() as u8..=range.end() as u8);
            }
            bytes
        }
    };
    (!bytes.is_empty()).then_some(bytes)
}

// ---------------------------------------------------------------------------
// NFA states
// ---------------------------------------------------------------------------

/// A single NFA state.
///
/// `Split` is followed during [`Matcher::addstate`]; `Byte` is stepped over
/// in [`Matcher::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Match a literal byte, then follow `out`.
    Byte { byte: u8, out: StateIdx },

    /// Epsilon fork: follow both `out` and `out1`.
    Split { out: StateIdx, out1: StateIdx },

    /// Accepting state.  Always at [`StateIdx::MATCH`].
    Match,
}

impl State {
    /// Whether every outgoing edge points at a real state.
    fn is_patched(&self) -> bool {
        match *self {
            State::Byte { out, .. } => out != StateIdx::NONE,
            State::Split { out, out1 } => out != StateIdx::NONE && out1 != StateIdx::NONE,
            State::Match => true,
        }
    }
}

/// Index into the NFA state array ([`Regex::states`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct StateIdx(u32);

impl StateIdx {
    /// Marker for an edge that has not been patched yet.
    const NONE: Self = Self(u32::MAX);

    /// The shared accepting state, first in every arena.
    const MATCH: Self = Self(0);

    /// Return the raw index as `usize`.  Panics on `NONE` in debug builds.
    #[inline]
    fn idx(self) -> usize {
        debug_assert!(self != Self::NONE, "StateIdx::NONE used as index");
        self.0 as usize
    }
}

impl fmt::Display for StateIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed access to the NFA state array: `states[state_idx]`.
impl Index<StateIdx> for [State] {
    type Output = State;

    #[inline]
    fn index(&self, idx: StateIdx) -> &State {
        &self[idx.idx()]
    }
}

impl IndexMut<StateIdx> for [State] {
    #[inline]
    fn index_mut(&mut self, idx: StateIdx) -> &mut State {
        &mut self[idx.idx()]
    }
}

// ---------------------------------------------------------------------------
// NFA fragments (used during construction)
// ---------------------------------------------------------------------------

/// Which outgoing edge of a state a [`Slot`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    /// `Byte::out` or `Split::out`.
    Out,
    /// `Split::out1`.
    Out1,
}

/// An outgoing edge that still points at [`StateIdx::NONE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    state: StateIdx,
    edge: Edge,
}

/// The open edges of a fragment.  Every slot is patched exactly once, to
/// the same target.
#[derive(Debug, Default)]
struct PatchList(Vec<Slot>);

impl PatchList {
    fn single(state: StateIdx, edge: Edge) -> Self {
        PatchList(vec![Slot { state, edge }])
    }

    /// Concatenate two lists without touching the states they refer to.
    fn append(mut self, mut other: PatchList) -> Self {
        self.0.append(&mut other.0);
        self
    }
}

/// A partially-built NFA with an entry state and its unpatched edges.
#[derive(Debug)]
struct Fragment {
    start: StateIdx,
    out: PatchList,
}

impl Fragment {
    fn new(start: StateIdx, out: PatchList) -> Self {
        Self { start, out }
    }
}

// ---------------------------------------------------------------------------
// Compiled regex
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StateList(Box<[State]>);

impl fmt::Debug for StateList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.0.iter().enumerate()).finish()
    }
}

impl std::ops::Deref for StateList {
    type Target = [State];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A compiled NFA ready for matching.
///
/// Immutable once built, so one `Regex` can be shared by any number of
/// threads as long as each uses its own [`MatcherMemory`].
#[derive(Clone, Debug)]
pub struct Regex {
    states: StateList,
    start: StateIdx,
}

impl Regex {
    /// Translate and compile `pattern` with the default configuration.
    pub fn new(pattern: impl AsRef<[u8]>) -> Result<Self, Error> {
        RegexBuilder::new().build(pattern)
    }

    /// Whether the regex matches the whole of `haystack`.
    pub fn is_match(&self, haystack: impl AsRef<[u8]>) -> bool {
        let mut memory = MatcherMemory::default();
        self.is_match_with(&mut memory, haystack)
    }

    /// Like [`is_match`](Self::is_match), reusing caller-owned scratch
    /// memory.  Stops early once no state is left alive.
    pub fn is_match_with(&self, memory: &mut MatcherMemory, haystack: impl AsRef<[u8]>) -> bool {
        let mut matcher = memory.matcher(self);
        for &b in haystack.as_ref() {
            if matcher.is_dead() {
                return false;
            }
            matcher.step(b);
        }
        matcher.finish()
    }

    /// Number of states in the automaton, including the `Match` state.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Return the total memory footprint (in bytes) of this compiled
    /// regex, including both inline and heap-allocated data.
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.states.len() * std::mem::size_of::<State>()
    }

    /// Emit a Graphviz DOT representation of the NFA.
    ///
    /// Byte transitions are labelled with the byte, epsilon edges of
    /// `Split` states are dashed and the `Match` state is double-circled.
    pub fn to_dot(&self, mut buffer: impl Write) -> io::Result<()> {
        let mut visited = vec![false; self.states.len()];
        writeln!(buffer, "digraph nfa {{")?;
        writeln!(buffer, "\trankdir=LR;")?;
        writeln!(buffer, "\t{} [shape=box];", self.start)?;
        let mut stack = vec![self.start];
        while let Some(s) = stack.pop() {
            if visited[s.idx()] {
                continue;
            }
            visited[s.idx()] = true;
            match self.states[s] {
                State::Byte { byte, out } => {
                    writeln!(
                        buffer,
                        "\t{} -> {} [label=\"{}\"];",
                        s,
                        out,
                        byte.escape_ascii()
                    )?;
                    stack.push(out);
                }
                State::Split { out, out1 } => {
                    writeln!(buffer, "\t{} -> {} [style=dashed];", s, out)?;
                    writeln!(buffer, "\t{} -> {} [style=dashed];", s, out1)?;
                    stack.push(out1);
                    stack.push(out);
                }
                State::Match => {
                    writeln!(buffer, "\t{} [peripheries=2];", s)?;
                }
            }
        }
        writeln!(buffer, "}}")
    }
}

// ---------------------------------------------------------------------------
// NFA builder (pattern -> postfix -> NFA)
// ---------------------------------------------------------------------------

/// Builds a compiled [`Regex`].
///
/// The builder is the only allocator of states.  It owns the state arena
/// and the operand stack for the duration of one build, and can be reused:
/// every build starts from an empty arena.
///
/// ```
/// use regex_thompson::RegexBuilder;
///
/// let re = RegexBuilder::new().size_limit(Some(64)).build("a(b|c)*").unwrap();
/// assert!(re.is_match("abcb"));
/// assert!(!re.is_match("abd"));
/// ```
#[derive(Debug)]
pub struct RegexBuilder {
    states: Vec<State>,
    frags: Vec<Fragment>,
    nest_limit: usize,
    size_limit: Option<usize>,
}

impl Default for RegexBuilder {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            frags: Vec::new(),
            nest_limit: DEFAULT_NEST_LIMIT,
            size_limit: None,
        }
    }
}

impl RegexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum group nesting depth accepted by [`translate`](Self::translate).
    pub fn nest_limit(&mut self, limit: usize) -> &mut Self {
        self.nest_limit = limit;
        self
    }

    /// Maximum number of NFA states, counting the `Match` state.  `None`
    /// means unlimited.
    pub fn size_limit(&mut self, limit: Option<usize>) -> &mut Self {
        self.size_limit = limit;
        self
    }

    /// Rewrite an infix pattern into postfix order.
    pub fn translate(&self, pattern: impl AsRef<[u8]>) -> Result<Postfix, Error> {
        let pattern = pattern.as_ref();
        let postfix = translate(pattern, self.nest_limit)?;
        debug!(
            "translated `{}` to postfix `{}`",
            pattern.escape_ascii(),
            postfix
        );
        Ok(postfix)
    }

    /// Translate and compile an infix pattern.
    pub fn build(&mut self, pattern: impl AsRef<[u8]>) -> Result<Regex, Error> {
        let postfix = self.translate(pattern)?;
        self.build_postfix(&postfix)
    }

    /// Compile a `regex-syntax` HIR (see [`Postfix::from_hir`]).
    pub fn build_hir(&mut self, hir: &Hir) -> Result<Regex, Error> {
        let postfix = Postfix::from_hir(hir)?;
        self.build_postfix(&postfix)
    }

    /// Compile a postfix stream into a ready-to-match [`Regex`].
    pub fn build_postfix(&mut self, postfix: &Postfix) -> Result<Regex, Error> {
        self.states.clear();
        self.frags.clear();

        let matched = self.state(State::Match)?;
        debug_assert_eq!(matched, StateIdx::MATCH);

        for (position, &node) in postfix.nodes().iter().enumerate() {
            trace!("postfix[{}] = {:?}", position, node);
            let frag = self.next_fragment(position, node)?;
            self.frags.push(frag);
        }

        let depth = self.frags.len();
        let e = match self.frags.pop() {
            Some(e) if depth == 1 => e,
            _ => {
                return Err(Error::MalformedPostfix {
                    position: postfix.len(),
                    kind: PostfixErrorKind::LeftoverFragments(depth),
                });
            }
        };
        self.patch(e.out, StateIdx::MATCH);

        debug_assert!(self.states.iter().all(State::is_patched));
        debug!("built NFA with {} states", self.states.len());

        Ok(Regex {
            states: StateList(self.states.as_slice().into()),
            start: e.start,
        })
    }

    // -- Low-level NFA construction helpers ----------------------------------

    /// Push a new NFA state and return its index.
    fn state(&mut self, state: State) -> Result<StateIdx, Error> {
        let idx = next_state_idx(self.states.len(), self.size_limit)?;
        self.states.push(state);
        Ok(idx)
    }

    /// Point every slot in `list` at `target`.
    fn patch(&mut self, list: PatchList, target: StateIdx) {
        for slot in list.0 {
            let out = match (&mut self.states.as_mut_slice()[slot.state], slot.edge) {
                (State::Byte { out, .. } | State::Split { out, .. }, Edge::Out) => out,
                (State::Split { out1, .. }, Edge::Out1) => out1,
                // Slots are only created on `Byte.out` and `Split.out1`.  An
                // edge left unpatched is caught by the check in `build_postfix`.
                (State::Byte { .. }, Edge::Out1) | (State::Match, _) => continue,
            };
            debug_assert_eq!(*out, StateIdx::NONE, "slot patched twice");
            *out = target;
        }
    }

    fn pop(&mut self, position: usize, node: PostfixNode) -> Result<Fragment, Error> {
        self.frags.pop().ok_or(Error::MalformedPostfix {
            position,
            kind: PostfixErrorKind::StackUnderflow(node.as_byte() as char),
        })
    }

    /// Consume one postfix node and return the corresponding NFA fragment.
    fn next_fragment(&mut self, position: usize, node: PostfixNode) -> Result<Fragment, Error> {
        let frag = match node {
            PostfixNode::Byte(byte) => {
                let s = self.state(State::Byte {
                    byte,
                    out: StateIdx::NONE,
                })?;
                Fragment::new(s, PatchList::single(s, Edge::Out))
            }
            PostfixNode::Catenate => {
                let e2 = self.pop(position, node)?;
                let e1 = self.pop(position, node)?;
                self.patch(e1.out, e2.start);
                Fragment::new(e1.start, e2.out)
            }
            PostfixNode::Alternate => {
                let e2 = self.pop(position, node)?;
                let e1 = self.pop(position, node)?;
                let s = self.state(State::Split {
                    out: e1.start,
                    out1: e2.start,
                })?;
                Fragment::new(s, e1.out.append(e2.out))
            }
            PostfixNode::RepeatZeroPlus => {
                let e = self.pop(position, node)?;
                let s = self.state(State::Split {
                    out: e.start,
                    out1: StateIdx::NONE,
                })?;
                self.patch(e.out, s);
                Fragment::new(s, PatchList::single(s, Edge::Out1))
            }
            PostfixNode::RepeatOnePlus => {
                let e = self.pop(position, node)?;
                let s = self.state(State::Split {
                    out: e.start,
                    out1: StateIdx::NONE,
                })?;
                self.patch(e.out, s);
                Fragment::new(e.start, PatchList::single(s, Edge::Out1))
            }
            PostfixNode::RepeatZeroOne => {
                let e = self.pop(position, node)?;
                let s = self.state(State::Split {
                    out: e.start,
                    out1: StateIdx::NONE,
                })?;
                Fragment::new(s, PatchList::single(s, Edge::Out1).append(e.out))
            }
        };
        Ok(frag)
    }
}

/// Index of the state that would be pushed onto an arena of `len` states.
/// `StateIdx::NONE` is never handed out, whatever `size_limit` says.
fn next_state_idx(len: usize, size_limit: Option<usize>) -> Result<StateIdx, Error> {
    let hard_limit = StateIdx::NONE.0 as usize;
    let limit = size_limit.map_or(hard_limit, |limit| limit.min(hard_limit));
    if len >= limit {
        return Err(Error::SizeLimitExceeded { limit });
    }
    Ok(StateIdx(len as u32))
}

// ---------------------------------------------------------------------------
// Matcher (NFA simulation)
// ---------------------------------------------------------------------------

/// Reusable memory for [`Matcher`].  Create once, call
/// [`matcher`](Self::matcher) for each haystack to match.
///
/// Never share one `MatcherMemory` between concurrent matches; the borrow
/// checker enforces this since [`matcher`](Self::matcher) takes `&mut self`.
#[derive(Debug, Default)]
pub struct MatcherMemory {
    /// Per-state: the `listid` when the state was last added.  Used for
    /// O(1) deduplication in `addstate`.
    lastlist: Vec<usize>,
    /// Current and next state lists (swapped each step).
    clist: Vec<StateIdx>,
    nlist: Vec<StateIdx>,
    /// Pending states of the epsilon closure being computed.
    stack: Vec<StateIdx>,
}

impl MatcherMemory {
    pub fn matcher<'a>(&'a mut self, regex: &'a Regex) -> Matcher<'a> {
        self.lastlist.clear();
        self.lastlist.resize(regex.states.len(), usize::MAX);
        self.clist.clear();
        self.nlist.clear();
        self.stack.clear();

        let mut m = Matcher {
            states: &regex.states,
            lastlist: &mut self.lastlist,
            listid: 0,
            clist: &mut self.clist,
            nlist: &mut self.nlist,
            stack: &mut self.stack,
            consumed: 0,
        };

        m.startlist(regex.start);
        m
    }
}

/// Runs a Thompson NFA simulation, anchored at both ends of the input.
pub struct Matcher<'a> {
    states: &'a [State],
    /// Per-state deduplication stamp (compared against `listid`).
    lastlist: &'a mut [usize],
    /// Monotonically increasing step ID.
    listid: usize,
    /// Current active state list.
    clist: &'a mut Vec<StateIdx>,
    /// Next active state list (built during a step).
    nlist: &'a mut Vec<StateIdx>,
    stack: &'a mut Vec<StateIdx>,
    /// Bytes fed so far.
    consumed: usize,
}

impl fmt::Debug for Matcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active: Vec<_> = self
            .clist
            .iter()
            .map(|&idx| (idx.0, self.states[idx]))
            .collect();
        f.debug_struct("Matcher")
            .field("consumed", &self.consumed)
            .field("clist", &active)
            .finish()
    }
}

impl<'a> Matcher<'a> {
    /// Compute the initial state list by following all epsilon transitions
    /// from `start`.
    #[inline]
    fn startlist(&mut self, start: StateIdx) {
        self.addstate(start);
        std::mem::swap(self.clist, self.nlist);
        self.listid += 1;
    }

    /// Add `idx` and everything reachable from it through `Split` states
    /// to `nlist`.  Only `Byte` and `Match` states are recorded.
    fn addstate(&mut self, idx: StateIdx) {
        self.stack.push(idx);
        while let Some(idx) = self.stack.pop() {
            let i = idx.idx();
            if self.lastlist[i] == self.listid {
                continue;
            }
            self.lastlist[i] = self.listid;

            match self.states[idx] {
                State::Split { out, out1 } => {
                    // `out` is explored first.
                    self.stack.push(out1);
                    self.stack.push(out);
                }
                State::Byte { .. } | State::Match => self.nlist.push(idx),
            }
        }
    }

    /// Advance the simulation by one input byte.
    ///
    /// For each `Byte` state in `clist` equal to `b`, follow its `out`
    /// edge through `addstate` to build the next list.
    pub fn step(&mut self, b: u8) {
        self.nlist.clear();
        for i in 0..self.clist.len() {
            if let State::Byte { byte, out } = self.states[self.clist[i]]
                && byte == b
            {
                self.addstate(out);
            }
        }
        std::mem::swap(self.clist, self.nlist);
        self.listid += 1;
        self.consumed += 1;
        trace!(
            "step {} on {:?}: {} live states",
            self.consumed,
            b as char,
            self.clist.len()
        );
    }

    /// Feed an entire byte slice through the matcher, one byte at a time.
    pub fn chunk(&mut self, input: &[u8]) {
        for &b in input {
            self.step(b);
        }
    }

    /// `true` once no state is alive.  No further input can lead to a
    /// match.
    pub fn is_dead(&self) -> bool {
        self.clist.is_empty()
    }

    /// Whether the input fed so far is matched as a whole.
    pub fn ismatch(&self) -> bool {
        self.clist.contains(&StateIdx::MATCH)
    }

    /// Signal end-of-input and return the final match result.
    pub fn finish(self) -> bool {
        self.ismatch()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
