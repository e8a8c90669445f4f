//! Injection tokens
//!
//! A [`Token`] identifies a module or a provider. Tokens are cheap to clone
//! and are used as map keys throughout the graph and the resolver.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Identity of a module or provider
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A plain string token such as `"CONFIG"`
    Name(Arc<str>),
    /// A process-unique symbol
    Symbol(Symbol),
    /// A class reference
    Type(TypeToken),
}

/// Unique symbol. Two symbols with the same description are still distinct.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

/// Class reference, the Rust stand-in for a constructor identity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl Token {
    /// String token
    pub fn name(name: impl AsRef<str>) -> Self {
        Token::Name(Arc::from(name.as_ref()))
    }

    /// Class token for `T`
    pub fn of<T: Any + ?Sized>() -> Self {
        Token::Type(TypeToken {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        })
    }

    /// Fresh symbol token
    pub fn symbol(description: impl AsRef<str>) -> Self {
        Token::Symbol(Symbol {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description.as_ref()),
        })
    }

    /// Short human readable label, used for graph node labels
    pub fn label(&self) -> String {
        match self {
            Token::Name(name) => name.to_string(),
            Token::Symbol(symbol) => format!("Symbol({})", symbol.description),
            Token::Type(ty) => short_type_name(ty.name).to_string(),
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Token::Type(_))
    }

    /// The `TypeId` behind a class token
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Token::Type(ty) => Some(ty.id),
            _ => None,
        }
    }
}

impl Symbol {
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl TypeToken {
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

/// Strips the module path from a type name, keeping generic arguments off.
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "{}", name),
            Token::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
            Token::Type(ty) => write!(f, "{}", short_type_name(ty.name)),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => f.debug_tuple("Name").field(&&**name).finish(),
            Token::Symbol(symbol) => f
                .debug_tuple("Symbol")
                .field(&symbol.id)
                .field(&&*symbol.description)
                .finish(),
            Token::Type(ty) => f.debug_tuple("Type").field(&ty.name).finish(),
        }
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::name(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Name(Arc::from(name))
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}
