//! Route pattern compilation.
//!
//! A URI such as `/users/<id:int>/posts/<slug>` becomes one anchored regex
//! with a named group per placeholder. Literal text is escaped.

use regex::Regex;

use super::RouteError;
use super::params::ParamValue;

/// Type tag of a path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// `[^/]+`, kept as a string. The default.
    String,
    /// `[0-9]+`, cast to `i64`.
    Int,
    /// `[0-9.]+`, cast to `f64`.
    Number,
    /// `[A-Za-z]+`, kept as a string.
    Alpha,
    /// Any other tag, used verbatim as a regex; kept as a string.
    Regex,
}

impl ParamType {
    fn lookup(tag: &str) -> (ParamType, Option<&'static str>) {
        match tag {
            "string" => (ParamType::String, Some("[^/]+")),
            "int" => (ParamType::Int, Some("[0-9]+")),
            "number" => (ParamType::Number, Some("[0-9.]+")),
            "alpha" => (ParamType::Alpha, Some("[A-Za-z]+")),
            _ => (ParamType::Regex, None),
        }
    }

    /// Converts a captured segment. `None` if it does not fit the type.
    pub fn cast(self, raw: &str) -> Option<ParamValue> {
        match self {
            ParamType::Int => raw.parse().ok().map(ParamValue::Int),
            ParamType::Number => raw.parse().ok().map(ParamValue::Number),
            ParamType::String | ParamType::Alpha | ParamType::Regex => {
                Some(ParamValue::Str(raw.to_owned()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub parameters: Vec<Parameter>,
    /// Some parameter may match a `/`, so slash counting can't bucket it.
    pub unhashable: bool,
}

impl CompiledPattern {
    /// Capture name of the parameter at `index`.
    pub fn group_name(index: usize) -> String {
        format!("p{index}")
    }
}

pub fn compile(uri: &str) -> Result<CompiledPattern, RouteError> {
    let invalid = |reason: String| RouteError::InvalidPattern {
        uri: uri.to_owned(),
        reason,
    };
    // A slash in the fragment that is not the negated-class `^/`.
    let slash_in_fragment = Regex::new(r"(^|[^^])/").map_err(|e| invalid(e.to_string()))?;

    let mut source = String::from("^");
    let mut parameters: Vec<Parameter> = Vec::new();
    let mut unhashable = false;
    let mut rest = uri;

    while let Some(open) = rest.find('<') {
        let Some(len) = rest[open + 1..].find('>') else {
            break;
        };
        if len == 0 {
            return Err(invalid("empty parameter <>".to_owned()));
        }
        source.push_str(&regex::escape(&rest[..open]));
        let placeholder = &rest[open + 1..open + 1 + len];
        rest = &rest[open + len + 2..];

        let (name, tag) = placeholder.split_once(':').unwrap_or((placeholder, "string"));
        if name.is_empty() {
            return Err(invalid(format!("unnamed parameter <{placeholder}>")));
        }
        if parameters.iter().any(|p| p.name == name) {
            return Err(invalid(format!("parameter {name} declared twice")));
        }

        let (kind, builtin) = ParamType::lookup(tag);
        let fragment = builtin.unwrap_or(tag);
        let fragment_regex = Regex::new(fragment).map_err(|e| invalid(e.to_string()))?;
        if slash_in_fragment.is_match(fragment) || fragment_regex.is_match("/") {
            unhashable = true;
        }

        source.push_str(&format!(
            "(?P<{}>{})",
            CompiledPattern::group_name(parameters.len()),
            fragment
        ));
        parameters.push(Parameter {
            name: name.to_owned(),
            kind,
        });
    }
    source.push_str(&regex::escape(rest));
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;
    Ok(CompiledPattern {
        regex,
        parameters,
        unhashable,
    })
}
