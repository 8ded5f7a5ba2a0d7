use crate::error::{CodegenError, CodegenResult};
use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<(String, Type)>,
    /// `None` for functions without `-> T`.
    pub return_type: Option<Type>,
    pub is_extern: bool,
}

impl FunctionSignature {
    /// Whether the result travels through a caller-provided buffer instead
    /// of `eax`.
    pub fn returns_aggregate(&self) -> bool {
        matches!(&self.return_type, Some(ty) if !ty.is_primitive())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub field_type: Type,
    /// Byte offset from the start of the struct.
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSignature {
    pub name: String,
    pub fields: Vec<StructField>,
    pub size: u32,
}

impl StructSignature {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Function declarations by name, in declaration order.
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<String, FunctionSignature>,
    order: Vec<String>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `signature` unless the name is taken. Returns whether it was
    /// inserted.
    pub fn insert(&mut self, signature: FunctionSignature) -> bool {
        if self.functions.contains_key(&signature.name) {
            return false;
        }
        self.order.push(signature.name.clone());
        self.functions.insert(signature.name.clone(), signature);
        true
    }

    pub fn get(&self, name: &str) -> CodegenResult<&FunctionSignature> {
        self.functions
            .get(name)
            .ok_or_else(|| CodegenError::UnknownSignature(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn externs(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.order
            .iter()
            .filter_map(|name| self.functions.get(name))
            .filter(|sig| sig.is_extern)
    }
}

#[derive(Debug, Default)]
pub struct StructTable {
    structs: HashMap<String, StructSignature>,
}

impl StructTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signature: StructSignature) -> bool {
        if self.structs.contains_key(&signature.name) {
            return false;
        }
        self.structs.insert(signature.name.clone(), signature);
        true
    }

    pub fn get(&self, name: &str) -> Option<&StructSignature> {
        self.structs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }
}

/// Distinct string literals keyed by their source text, labelled `__str0`,
/// `__str1`, ... in first-seen order.
#[derive(Debug, Default)]
pub struct LiteralTable {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl LiteralTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, raw: &str) -> &str {
        let next = self.entries.len();
        let slot = *self.index.entry(raw.to_string()).or_insert(next);
        if slot == next {
            self.entries.push((raw.to_string(), format!("__str{}", next)));
        }
        &self.entries[slot].1
    }

    pub fn label(&self, raw: &str) -> CodegenResult<&str> {
        self.index
            .get(raw)
            .map(|&i| self.entries[i].1.as_str())
            .ok_or_else(|| CodegenError::UndefinedSymbol(format!("\"{}\"", raw)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(raw text, label)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(raw, label)| (raw.as_str(), label.as_str()))
    }
}

/// Operand list of a NUL-terminated `db` directive for a raw literal.
///
/// Printable runs stay quoted. Escapes and quote characters become byte
/// values: `"a\n"` gives `"a", 0xA, 0`.
pub fn data_bytes(raw: &str) -> String {
    let mut parts = Vec::new();
    let mut run = String::new();
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        let byte = match ch {
            '\\' => match chars.next() {
                Some('n') => Some("0xA"),
                Some('t') => Some("0x9"),
                Some('0') => Some("0x0"),
                Some('\\') => Some("0x5C"),
                Some('"') => Some("0x22"),
                Some('\'') => Some("0x27"),
                Some(other) => {
                    run.push(other);
                    None
                }
                None => None,
            },
            '"' => Some("0x22"),
            '\'' => Some("0x27"),
            _ => {
                run.push(ch);
                None
            }
        };

        if let Some(byte) = byte {
            flush(&mut run, &mut parts);
            parts.push(byte.to_string());
        }
    }

    flush(&mut run, &mut parts);
    parts.push("0".to_string());
    parts.join(", ")
}

fn flush(run: &mut String, parts: &mut Vec<String>) {
    if !run.is_empty() {
        parts.push(format!("\"{}\"", run));
        run.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_are_deduplicated_in_first_seen_order() {
        let mut literals = LiteralTable::new();
        assert_eq!(literals.intern("hi"), "__str0");
        assert_eq!(literals.intern("bye"), "__str1");
        assert_eq!(literals.intern("hi"), "__str0");
        assert_eq!(literals.len(), 2);
        assert_eq!(literals.label("bye").unwrap(), "__str1");
        assert!(literals.label("missing").is_err());
    }

    #[test]
    fn test_data_bytes_translates_escapes() {
        assert_eq!(data_bytes("Hello\\n"), "\"Hello\", 0xA, 0");
        assert_eq!(data_bytes("a\\tb"), "\"a\", 0x9, \"b\", 0");
        assert_eq!(data_bytes("say \\\"x\\\""), "\"say \", 0x22, \"x\", 0x22, 0");
        assert_eq!(data_bytes("it's"), "\"it\", 0x27, \"s\", 0");
        assert_eq!(data_bytes(""), "0");
    }

    #[test]
    fn test_first_function_declaration_wins() {
        let mut table = FunctionTable::new();
        assert!(table.insert(FunctionSignature {
            name: "f".to_string(),
            params: vec![],
            return_type: Some(Type::i32()),
            is_extern: false,
        }));
        assert!(!table.insert(FunctionSignature {
            name: "f".to_string(),
            params: vec![("a".to_string(), Type::i32())],
            return_type: None,
            is_extern: true,
        }));
        let f = table.get("f").unwrap();
        assert!(f.params.is_empty());
        assert!(!f.is_extern);
        assert_eq!(
            table.get("g"),
            Err(CodegenError::UnknownSignature("g".to_string()))
        );
    }
}
