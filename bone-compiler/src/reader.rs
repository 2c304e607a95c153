//! The reader: a recursive-descent parser from source text to `Value`
//! s-expressions, reading one form at a time from a character cursor.
//!
//! Quote-family shorthand (`'x`, `` `x ``, `,x`, `,@x`) expands to the
//! corresponding two-element list at read time; there is no macro
//! expander anywhere in this crate, so `(quasiquote ...)` forms reach the
//! compiler unexpanded and compile like any other call — evaluating
//! `quasiquote` at runtime, if it is ever bound, is a decision left to the
//! standard library, not the reader.

use bone_runtime::error::ReaderError;
use bone_runtime::pair::{cons, str_of};
use bone_runtime::region::RegionAllocator;
use bone_runtime::symbol::SymbolTable;
use bone_core::{Tag, Value};

pub struct Reader<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

type ReadResult<T> = Result<T, ReaderError>;

impl<'a> Reader<'a> {
    pub fn new(src: &'a str) -> Reader<'a> {
        Reader {
            chars: src.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_atmosphere(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.next();
                }
                Some(';') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.next();
                    }
                }
                _ => break,
            }
        }
    }

    /// Read the next top-level form, or `Value::EOF` if the input is
    /// exhausted (whitespace and comments only).
    pub fn read(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
    ) -> ReadResult<Value> {
        self.skip_atmosphere();
        match self.peek() {
            None => Ok(Value::EOF),
            Some(')') => {
                self.next();
                Err(ReaderError::UnexpectedCloseParen)
            }
            Some('(') => {
                self.next();
                self.read_list(regions, symbols)
            }
            Some('"') => {
                self.next();
                self.read_string(regions)
            }
            Some('\'') => {
                self.next();
                self.read_wrapped(regions, symbols, "quote")
            }
            Some('`') => {
                self.next();
                self.read_wrapped(regions, symbols, "quasiquote")
            }
            Some(',') => {
                self.next();
                if self.peek() == Some('@') {
                    self.next();
                    self.read_wrapped(regions, symbols, "unquote-splicing")
                } else {
                    self.read_wrapped(regions, symbols, "unquote")
                }
            }
            Some('|') => {
                self.next();
                self.read_lambda_short_form(regions, symbols)
            }
            Some('#') => {
                self.next();
                self.read_hash(regions, symbols)
            }
            Some(_) => self.read_atom(regions, symbols),
        }
    }

    fn read_wrapped(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
        sym_name: &str,
    ) -> ReadResult<Value> {
        let inner = self.read(regions, symbols)?;
        let sym = symbols.intern(regions, sym_name);
        let tail = cons(regions, inner, Value::NIL);
        Ok(cons(regions, sym, tail))
    }

    /// `(a b . c)` as well as `(a b c)`. A symbol read as exactly `.`
    /// (checked by identity, after interning, not by lookahead) switches
    /// to reading a single tail form, which must be followed immediately
    /// by the closing paren.
    fn read_list(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
    ) -> ReadResult<Value> {
        let mut items = Vec::new();
        let mut tail = Value::NIL;
        loop {
            self.skip_atmosphere();
            if self.peek() == Some(')') {
                self.next();
                break;
            }
            let item = self.read(regions, symbols)?;
            if item == Value::EOF {
                return Err(ReaderError::EofInList);
            }
            if is_dot_symbol(item) {
                tail = self.read(regions, symbols)?;
                if tail == Value::EOF {
                    return Err(ReaderError::EofInList);
                }
                self.skip_atmosphere();
                if self.next() != Some(')') {
                    return Err(ReaderError::InvalidDottedPair);
                }
                break;
            }
            items.push(item);
        }
        let mut list = tail;
        for item in items.into_iter().rev() {
            list = cons(regions, item, list);
        }
        Ok(list)
    }

    fn read_string(&mut self, regions: &mut RegionAllocator) -> ReadResult<Value> {
        let mut s = String::new();
        loop {
            match self.next() {
                None => return Err(ReaderError::EofInString),
                Some('"') => break,
                Some('\\') => match self.next() {
                    None => return Err(ReaderError::EofAfterBackslash),
                    Some(c @ ('\\' | '\'')) => s.push(c),
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(_) => return Err(ReaderError::InvalidStringEscape),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(str_of(regions, &s))
    }

    /// `|params body` — the short form for `(lambda params body)`.
    ///
    /// Matches the original reader's own two-phase grammar exactly: forms
    /// are read one at a time and treated as parameters for as long as
    /// they are bare symbols; the first form that is itself a list becomes
    /// the (single) body expression, terminating the parameter list. A
    /// bare `.` switches to reading one variadic rest-parameter followed
    /// by the body, e.g. `|a . rest (cons a rest)`.
    fn read_lambda_short_form(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
    ) -> ReadResult<Value> {
        let (params, variadic_rest, body) = self.lambda_parser(regions, symbols)?;
        // `(a b . rest)` when a rest parameter was read, `(a b)` otherwise
        // — same shape `read_list` builds for an explicit dotted list.
        let mut args_value = variadic_rest.unwrap_or(Value::NIL);
        for p in params.into_iter().rev() {
            args_value = cons(regions, p, args_value);
        }
        let lambda_sym = symbols.intern(regions, "lambda");
        let body_tail = cons(regions, body, Value::NIL);
        let params_tail = cons(regions, args_value, body_tail);
        Ok(cons(regions, lambda_sym, params_tail))
    }

    #[allow(clippy::type_complexity)]
    fn lambda_parser(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
    ) -> ReadResult<(Vec<Value>, Option<Value>, Value)> {
        let mut params = Vec::new();
        loop {
            let x = self.read(regions, symbols)?;
            if x == Value::EOF {
                return Err(ReaderError::EmptyLambdaBody);
            }
            if x.is_tagged(Tag::Cons) && !x.is_nil() {
                return Ok((params, None, x));
            }
            if x.is_nil() {
                return Err(ReaderError::EmptyLambdaBody);
            }
            if is_dot_symbol(x) {
                let rest = self.read(regions, symbols)?;
                let body = self.read(regions, symbols)?;
                if body == Value::EOF {
                    return Err(ReaderError::EmptyLambdaBody);
                }
                return Ok((params, Some(rest), body));
            }
            params.push(x);
        }
    }

    fn read_hash(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
    ) -> ReadResult<Value> {
        match self.next() {
            Some('t') => Ok(Value::TRUE),
            Some('f') => Ok(Value::FALSE),
            Some('!') => {
                // A Unix-style shebang line: skip to end-of-line and read
                // the next real form in its place.
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.next();
                }
                self.read(regions, symbols)
            }
            _ => Err(ReaderError::InvalidHashChar),
        }
    }

    fn read_atom(
        &mut self,
        regions: &mut RegionAllocator,
        symbols: &mut SymbolTable,
    ) -> ReadResult<Value> {
        let text = self.read_symbol_text();
        if let Ok(n) = text.parse::<i32>() {
            return Ok(Value::of_int(n));
        }
        Ok(symbols.intern(regions, &text))
    }

    fn read_symbol_text(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_symbol_char(c) {
                s.push(c);
                self.next();
            } else {
                break;
            }
        }
        s
    }
}

fn is_dot_symbol(x: Value) -> bool {
    x.is_tagged(Tag::Sym) && bone_runtime::symbol::name_of(x).map(|n| n == ".").unwrap_or(false)
}

/// The printable ASCII set minus whitespace and `"#'(),@;[]`{}|`.
fn is_symbol_char(c: char) -> bool {
    c.is_ascii_graphic()
        && !matches!(
            c,
            '"' | '#' | '\'' | '(' | ')' | ',' | '@' | ';' | '[' | ']' | '`' | '{' | '}' | '|'
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bone_runtime::pair::{car, cdr, list_to_vec, string_of};

    fn read_one(src: &str) -> (Value, RegionAllocator, SymbolTable) {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut reader = Reader::new(src);
        let v = reader.read(&mut regions, &mut symbols).unwrap();
        (v, regions, symbols)
    }

    #[test]
    fn reads_integers() {
        let (v, _, _) = read_one("42");
        assert_eq!(v.int_of().unwrap(), 42);
    }

    #[test]
    fn reads_negative_integers() {
        let (v, _, _) = read_one("-7");
        assert_eq!(v.int_of().unwrap(), -7);
    }

    #[test]
    fn reads_symbols() {
        let (v, _, symbols) = read_one("foo-bar?");
        let _ = symbols;
        assert!(v.is_tagged(bone_core::Tag::Sym));
    }

    #[test]
    fn reads_proper_lists() {
        let (v, _, _) = read_one("(1 2 3)");
        let items = list_to_vec(v).unwrap();
        assert_eq!(items, vec![Value::of_int(1), Value::of_int(2), Value::of_int(3)]);
    }

    #[test]
    fn reads_dotted_pairs() {
        let (v, _, _) = read_one("(1 . 2)");
        assert_eq!(car(v).unwrap(), Value::of_int(1));
        assert_eq!(cdr(v).unwrap(), Value::of_int(2));
    }

    #[test]
    fn reads_strings_with_escapes() {
        let (v, _, _) = read_one(r#""a\nb""#);
        assert_eq!(string_of(v).unwrap(), "a\nb");
    }

    #[test]
    fn reads_quote_sugar() {
        let (v, _, symbols) = read_one("'x");
        let items = list_to_vec(v).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(bone_runtime::symbol::name_of(items[0]).unwrap(), "quote");
        let _ = symbols;
    }

    #[test]
    fn reads_quasiquote_and_unquote_splicing() {
        let (v, _, _) = read_one("`(a ,@b)");
        let items = list_to_vec(v).unwrap();
        assert_eq!(bone_runtime::symbol::name_of(items[0]).unwrap(), "quasiquote");
    }

    #[test]
    fn reads_lambda_short_form() {
        let (v, _, _) = read_one("|x (foo x)");
        let items = list_to_vec(v).unwrap();
        assert_eq!(bone_runtime::symbol::name_of(items[0]).unwrap(), "lambda");
        let params = list_to_vec(items[1]).unwrap();
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn lambda_short_form_supports_a_rest_parameter() {
        let (v, _, _) = read_one("|a . rest (cons a rest)");
        let items = list_to_vec(v).unwrap();
        assert_eq!(bone_runtime::symbol::name_of(items[0]).unwrap(), "lambda");
        // `(a . rest)`: one fixed parameter, then an improper tail naming
        // the rest parameter — the same shape `(a . rest)` reads as a
        // dotted pair.
        assert!(items[1].is_tagged(bone_core::Tag::Cons));
        assert!(bone_runtime::symbol::name_of(car(items[1]).unwrap()).unwrap() == "a");
        let tail = cdr(items[1]).unwrap();
        assert!(tail.is_tagged(bone_core::Tag::Sym));
        assert_eq!(bone_runtime::symbol::name_of(tail).unwrap(), "rest");
    }

    #[test]
    fn lambda_short_form_fully_variadic_with_no_fixed_params() {
        let (v, _, _) = read_one("|. rest rest");
        let items = list_to_vec(v).unwrap();
        assert_eq!(bone_runtime::symbol::name_of(items[0]).unwrap(), "lambda");
        assert!(items[1].is_tagged(bone_core::Tag::Sym));
        assert_eq!(bone_runtime::symbol::name_of(items[1]).unwrap(), "rest");
    }

    #[test]
    fn empty_lambda_short_form_body_is_an_error() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut reader = Reader::new("|x ");
        assert_eq!(
            reader.read(&mut regions, &mut symbols).unwrap_err(),
            ReaderError::EmptyLambdaBody
        );
    }

    #[test]
    fn unexpected_close_paren_is_an_error() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut reader = Reader::new(")");
        assert_eq!(
            reader.read(&mut regions, &mut symbols).unwrap_err(),
            ReaderError::UnexpectedCloseParen
        );
    }

    #[test]
    fn eof_in_list_is_an_error() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut reader = Reader::new("(1 2");
        assert_eq!(
            reader.read(&mut regions, &mut symbols).unwrap_err(),
            ReaderError::EofInList
        );
    }

    #[test]
    fn eof_at_top_level_is_the_eof_sentinel() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut reader = Reader::new("   ; just a comment\n");
        assert_eq!(reader.read(&mut regions, &mut symbols).unwrap(), Value::EOF);
    }

    #[test]
    fn reads_multiple_forms_in_sequence() {
        let mut regions = RegionAllocator::new();
        let mut symbols = SymbolTable::new();
        let mut reader = Reader::new("1 2 3");
        assert_eq!(reader.read(&mut regions, &mut symbols).unwrap(), Value::of_int(1));
        assert_eq!(reader.read(&mut regions, &mut symbols).unwrap(), Value::of_int(2));
        assert_eq!(reader.read(&mut regions, &mut symbols).unwrap(), Value::of_int(3));
        assert_eq!(reader.read(&mut regions, &mut symbols).unwrap(), Value::EOF);
    }
}
