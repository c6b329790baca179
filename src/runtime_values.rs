use super::*;

pub type NativeFn = dyn Fn(&mut Runtime, &Value, &[Value]) -> Result<Value>;

#[derive(Debug, Clone)]
pub enum Property {
    Data(Value),
    Accessor { getter: Value },
}

#[derive(Debug, Clone, Default)]
pub struct ObjectValue {
    pub(crate) entries: Vec<(String, Property)>,
    pub(crate) index_by_key: HashMap<String, usize>,
}

impl ObjectValue {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        let mut value = Self::default();
        for (key, entry_value) in entries {
            value.insert(key, entry_value);
        }
        value
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.put(key.into(), Property::Data(value));
    }

    /// Installs an accessor whose getter runs on every read of `key`.
    pub fn define_getter(&mut self, key: impl Into<String>, getter: Value) {
        self.put(key.into(), Property::Accessor { getter });
    }

    pub fn get_entry(&self, key: &str) -> Option<&Property> {
        self.index_by_key
            .get(key)
            .and_then(|idx| self.entries.get(*idx))
            .map(|(_, property)| property)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn put(&mut self, key: String, property: Property) {
        if let Some(idx) = self.index_by_key.get(&key).copied() {
            self.entries[idx].1 = property;
            return;
        }
        self.index_by_key.insert(key.clone(), self.entries.len());
        self.entries.push((key, property));
    }
}

pub struct FunctionValue {
    pub(crate) name: String,
    pub(crate) properties: RefCell<ObjectValue>,
    pub(crate) body: Box<NativeFn>,
}

impl FunctionValue {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert_property(&self, key: impl Into<String>, value: Value) {
        self.properties.borrow_mut().insert(key, value);
    }

    pub fn define_getter(&self, key: impl Into<String>, getter: Value) {
        self.properties.borrow_mut().define_getter(key, getter);
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(i64),
    Float(f64),
    BigInt(BigInt),
    String(String),
    Object(Rc<RefCell<ObjectValue>>),
    Function(Rc<FunctionValue>),
    Promise(Promise),
    Error(Rc<ErrorValue>),
}

impl Value {
    pub fn object(entries: Vec<(&str, Value)>) -> Self {
        Self::from_object(ObjectValue::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        ))
    }

    pub fn from_object(object: ObjectValue) -> Self {
        Self::Object(Rc::new(RefCell::new(object)))
    }

    pub fn function<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut Runtime, &Value, &[Value]) -> Result<Value> + 'static,
    {
        Self::Function(Rc::new(FunctionValue {
            name: name.to_string(),
            properties: RefCell::new(ObjectValue::default()),
            body: Box::new(body),
        }))
    }

    pub fn error(name: &str, message: &str) -> Self {
        Self::Error(Rc::new(ErrorValue::new(name, message)))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Values a `then` member may be read from.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Function(_) | Self::Promise(_) | Self::Error(_)
        )
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Self::Promise(promise) => Some(promise),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) | Self::Float(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Object(_) | Self::Promise(_) | Self::Error(_) => "object",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Number(a), Self::Float(b)) | (Self::Float(b), Self::Number(a)) => {
                (*a as f64) == *b
            }
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Promise(a), Self::Promise(b)) => a.ptr_eq(b),
            (Self::Error(a), Self::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Number(value) => write!(f, "Number({value})"),
            Self::Float(value) => write!(f, "Float({value})"),
            Self::BigInt(value) => write!(f, "BigInt({value})"),
            Self::String(value) => write!(f, "String({value:?})"),
            Self::Object(object) => match object.try_borrow() {
                Ok(object) => f.debug_set().entries(object.keys()).finish(),
                Err(_) => write!(f, "Object(<borrowed>)"),
            },
            Self::Function(function) => write!(f, "Function({:?})", function.name),
            Self::Promise(promise) => write!(f, "{promise:?}"),
            Self::Error(error) => write!(f, "Error({error})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Float(value) => {
                if value.is_nan() {
                    write!(f, "NaN")
                } else if value.is_infinite() {
                    write!(f, "{}Infinity", if *value < 0.0 { "-" } else { "" })
                } else {
                    write!(f, "{value}")
                }
            }
            Self::BigInt(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
            Self::Object(_) => write!(f, "[object Object]"),
            Self::Function(function) => {
                write!(f, "function {}() {{ [native code] }}", function.name)
            }
            Self::Promise(_) => write!(f, "[object Promise]"),
            Self::Error(error) => write!(f, "{error}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Self::BigInt(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Promise> for Value {
    fn from(value: Promise) -> Self {
        Self::Promise(value)
    }
}

impl From<ErrorValue> for Value {
    fn from(value: ErrorValue) -> Self {
        Self::Error(Rc::new(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Debug)]
pub(crate) struct PromiseValue {
    pub(crate) id: usize,
    pub(crate) state: PromiseState,
    pub(crate) fulfill_reactions: Vec<PromiseReaction>,
    pub(crate) reject_reactions: Vec<PromiseReaction>,
}

impl Drop for PromiseValue {
    // Pending chains own their derived promises; unlink them iteratively so a
    // long never-settled chain does not recurse once per link.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.fulfill_reactions);
        pending.append(&mut self.reject_reactions);
        while let Some(reaction) = pending.pop() {
            let next = reaction.kind.into_target();
            if Rc::strong_count(&next.inner) != 1 {
                continue;
            }
            if let Ok(mut record) = next.inner.try_borrow_mut() {
                pending.append(&mut record.fulfill_reactions);
                pending.append(&mut record.reject_reactions);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PromiseReaction {
    pub(crate) kind: PromiseReactionKind,
}

#[derive(Debug, Clone)]
pub(crate) enum PromiseReactionKind {
    Then {
        handler: Option<Value>,
        result: Promise,
    },
    Finally {
        callback: Option<Value>,
        result: Promise,
    },
    FinallyContinuation {
        original: PromiseSettledValue,
        result: Promise,
    },
    ResolveTo {
        target: Promise,
    },
}

impl PromiseReactionKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Then { .. } => "then",
            Self::Finally { .. } => "finally",
            Self::FinallyContinuation { .. } => "finally-continuation",
            Self::ResolveTo { .. } => "resolve-to",
        }
    }

    fn into_target(self) -> Promise {
        match self {
            Self::Then { result, .. }
            | Self::Finally { result, .. }
            | Self::FinallyContinuation { result, .. } => result,
            Self::ResolveTo { target } => target,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PromiseSettledValue {
    Fulfilled(Value),
    Rejected(Value),
}
