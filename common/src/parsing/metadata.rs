//! Typed metadata directives. Raw directives from the parser are converted
//! into these via [MetaData::from_raw]; each keyword declares which parameter
//! the unnamed first argument binds to.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::model::{ParamValue, RawDirective, Span, Spanned};
use crate::tables::DynamicLevel;
use serde::Serialize;
use std::fmt::Write as _;

macro_rules! keyword_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }
        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_name(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

keyword_enum!(Scope {
    Gongan => "GONGAN",
    Score => "SCORE",
});

keyword_enum!(Switch {
    Off => "off",
    On => "on",
});

keyword_enum!(GonganType {
    Regular => "regular",
    Kebyar => "kebyar",
    Gineman => "gineman",
});

keyword_enum!(ValidationProperty {
    BeatDuration => "beat-duration",
    StaveLength => "stave-length",
    InstrumentRange => "instrument-range",
    Kempyung => "kempyung",
});

/// A pass filter; the empty list means "all passes".
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Passes(pub Vec<u32>);
impl Passes {
    pub fn matches(&self, pass: u32) -> bool {
        self.0.is_empty() || self.0.contains(&pass)
    }

    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }
}

/// A beat filter; the empty list means "all beats".
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Beats(pub Vec<u32>);
impl Beats {
    pub fn matches(&self, beat_id: u32) -> bool {
        self.0.is_empty() || self.0.contains(&beat_id)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DynamicsMeta {
    pub value: DynamicLevel,
    /// Position tags; empty stands for all positions.
    pub positions: Vec<Spanned<String>>,
    pub first_beat: u32,
    pub beat_count: u32,
    pub passes: Passes,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GonganMeta {
    pub gongan_type: GonganType,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GotoMeta {
    pub label: Spanned<String>,
    /// `None` means the last beat of the gongan.
    pub from_beat: Option<u32>,
    pub passes: Passes,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct KempliMeta {
    pub status: Switch,
    pub beats: Beats,
    pub scope: Scope,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AutoKempyungMeta {
    pub status: Switch,
    pub positions: Vec<Spanned<String>>,
    pub scope: Scope,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LabelMeta {
    pub name: Spanned<String>,
    pub beat: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OctavateMeta {
    pub instrument: Spanned<String>,
    pub octaves: i32,
    pub scope: Scope,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PartMeta {
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RepeatMeta {
    pub count: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SequenceMeta {
    pub labels: Vec<Spanned<String>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SuppressMeta {
    pub positions: Vec<Spanned<String>>,
    pub beats: Beats,
    pub passes: Passes,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TempoMeta {
    pub value: u32,
    pub first_beat: u32,
    pub beat_count: u32,
    pub passes: Passes,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ValidationMeta {
    pub ignore: Vec<ValidationProperty>,
    pub beats: Beats,
    pub scope: Scope,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WaitMeta {
    pub seconds: f64,
    pub passes: Passes,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum MetaData {
    AutoKempyung(AutoKempyungMeta),
    Dynamics(DynamicsMeta),
    Gongan(GonganMeta),
    Goto(GotoMeta),
    Kempli(KempliMeta),
    Label(LabelMeta),
    Octavate(OctavateMeta),
    Part(PartMeta),
    Repeat(RepeatMeta),
    Sequence(SequenceMeta),
    Suppress(SuppressMeta),
    Tempo(TempoMeta),
    Validation(ValidationMeta),
    Wait(WaitMeta),
}

impl MetaData {
    pub fn keyword(&self) -> &'static str {
        match self {
            MetaData::AutoKempyung(_) => "AUTOKEMPYUNG",
            MetaData::Dynamics(_) => "DYNAMICS",
            MetaData::Gongan(_) => "GONGAN",
            MetaData::Goto(_) => "GOTO",
            MetaData::Kempli(_) => "KEMPLI",
            MetaData::Label(_) => "LABEL",
            MetaData::Octavate(_) => "OCTAVATE",
            MetaData::Part(_) => "PART",
            MetaData::Repeat(_) => "REPEAT",
            MetaData::Sequence(_) => "SEQUENCE",
            MetaData::Suppress(_) => "SUPPRESS",
            MetaData::Tempo(_) => "TEMPO",
            MetaData::Validation(_) => "VALIDATION",
            MetaData::Wait(_) => "WAIT",
        }
    }

    /// The directive's scope; directives without a scope parameter attach to
    /// their gongan.
    pub fn scope(&self) -> Scope {
        match self {
            MetaData::AutoKempyung(x) => x.scope,
            MetaData::Kempli(x) => x.scope,
            MetaData::Octavate(x) => x.scope,
            MetaData::Validation(x) => x.scope,
            _ => Scope::Gongan,
        }
    }

    /// Labels must be materialized before the gotos that may point at them.
    pub fn processing_order(&self) -> u32 {
        match self {
            MetaData::Label(_) => 1,
            _ => 99,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw-to-typed conversion

/// Tracks which raw parameters have been consumed. The unnamed first argument
/// binds to the keyword's default parameter name; anything left unconsumed at
/// the end is an unknown parameter.
struct Params<'a> {
    diags: &'a Diagnostics,
    keyword: &'a str,
    span: Span,
    items: Vec<(Option<Spanned<String>>, &'a Spanned<ParamValue>, bool)>,
}

impl<'a> Params<'a> {
    fn new(
        diags: &'a Diagnostics,
        d: &'a RawDirective,
        span: Span,
        default_param: Option<&str>,
    ) -> Self {
        let mut items = Vec::new();
        for (i, p) in d.params.iter().enumerate() {
            let mut used = false;
            let key = match (&p.key, i) {
                (Some(k), _) => Some(k.clone()),
                (None, 0) => match default_param {
                    Some(name) => Some(Spanned::new(p.value.span, name)),
                    None => {
                        diags.err(
                            code::MALFORMED_DIRECTIVE,
                            p.value.span,
                            format!("'{}' takes no unnamed parameter", d.name.value),
                        );
                        used = true;
                        None
                    }
                },
                (None, _) => {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        p.value.span,
                        format!("'{}': only the first parameter may be unnamed", d.name.value),
                    );
                    used = true;
                    None
                }
            };
            items.push((key, &p.value, used));
        }
        Self {
            diags,
            keyword: &d.name.value,
            span,
            items,
        }
    }

    fn take(&mut self, key: &str) -> Option<&'a Spanned<ParamValue>> {
        for (k, v, used) in self.items.iter_mut() {
            if !*used && k.as_ref().is_some_and(|k| k.value == key) {
                *used = true;
                return Some(v);
            }
        }
        None
    }

    fn wrong_type(&self, span: Span, key: &str, wanted: &str) {
        self.diags.err(
            code::MALFORMED_DIRECTIVE,
            span,
            format!("'{}': '{key}' should be {wanted}", self.keyword),
        );
    }

    fn required(&mut self, key: &str) -> Option<&'a Spanned<ParamValue>> {
        let v = self.take(key);
        if v.is_none() {
            self.diags.err(
                code::MALFORMED_DIRECTIVE,
                self.span,
                format!("'{}': missing required parameter '{key}'", self.keyword),
            );
        }
        v
    }

    fn u32(&mut self, key: &str, default: u32) -> u32 {
        self.opt_u32(key).unwrap_or(default)
    }

    fn opt_u32(&mut self, key: &str) -> Option<u32> {
        let v = self.take(key)?;
        match v.value.try_as_i64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => Some(n),
            None => {
                self.wrong_type(v.span, key, "a non-negative integer");
                None
            }
        }
    }

    fn required_u32(&mut self, key: &str) -> Option<u32> {
        let v = self.required(key)?;
        match v.value.try_as_i64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => Some(n),
            None => {
                self.wrong_type(v.span, key, "a non-negative integer");
                None
            }
        }
    }

    fn required_i32(&mut self, key: &str) -> Option<i32> {
        let v = self.required(key)?;
        match v.value.try_as_i64().and_then(|n| i32::try_from(n).ok()) {
            Some(n) => Some(n),
            None => {
                self.wrong_type(v.span, key, "an integer");
                None
            }
        }
    }

    fn required_f64(&mut self, key: &str) -> Option<f64> {
        let v = self.required(key)?;
        match v.value.try_as_f64() {
            Some(x) => Some(x),
            None => {
                self.wrong_type(v.span, key, "a number");
                None
            }
        }
    }

    fn required_string(&mut self, key: &str) -> Option<Spanned<String>> {
        let v = self.required(key)?;
        match v.value.try_as_str() {
            Some(s) => Some(Spanned::new(v.span, s)),
            None => {
                self.wrong_type(v.span, key, "a name or string");
                None
            }
        }
    }

    fn required_word<T: Copy>(
        &mut self,
        key: &str,
        what: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let v = self.required(key)?;
        match v.value.try_as_str().and_then(&parse) {
            Some(x) => Some(x),
            None => {
                self.wrong_type(v.span, key, what);
                None
            }
        }
    }

    fn word_or<T: Copy>(
        &mut self,
        key: &str,
        what: &str,
        default: T,
        parse: impl Fn(&str) -> Option<T>,
    ) -> T {
        let Some(v) = self.take(key) else {
            return default;
        };
        match v.value.try_as_str().and_then(&parse) {
            Some(x) => x,
            None => {
                self.wrong_type(v.span, key, what);
                default
            }
        }
    }

    fn u32_list(&mut self, key: &str) -> Vec<u32> {
        let Some(v) = self.take(key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for item in v.value.as_list() {
            match item.value.try_as_i64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => out.push(n),
                None => self.wrong_type(v.span, key, "a list of non-negative integers"),
            }
        }
        out
    }

    fn string_list(&mut self, key: &str) -> Vec<Spanned<String>> {
        let Some(v) = self.take(key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for item in v.value.as_list() {
            match item.value.try_as_str() {
                Some(s) => out.push(Spanned::new(v.span, s)),
                None => self.wrong_type(v.span, key, "a list of names"),
            }
        }
        out
    }

    fn passes(&mut self) -> Passes {
        Passes(self.u32_list("passes"))
    }

    fn beats(&mut self) -> Beats {
        Beats(self.u32_list("beats"))
    }

    fn scope(&mut self) -> Scope {
        self.word_or("scope", "GONGAN or SCORE", Scope::Gongan, Scope::from_name)
    }

    fn switch(&mut self, key: &str) -> Option<Switch> {
        self.required_word(key, "'on' or 'off'", Switch::from_name)
    }

    fn finish(self) {
        for (k, v, used) in self.items {
            if !used {
                let (span, what) = match &k {
                    Some(k) => (k.span, k.value.clone()),
                    None => (v.span, "<unnamed>".to_string()),
                };
                self.diags.err(
                    code::MALFORMED_DIRECTIVE,
                    span,
                    format!("'{}': unknown parameter '{what}'", self.keyword),
                );
            }
        }
    }
}

impl MetaData {
    /// Converts a raw directive. Returns `None` after recording diagnostics
    /// when the directive is unknown or malformed.
    pub fn from_raw(diags: &Diagnostics, d: &Spanned<RawDirective>) -> Option<MetaData> {
        let span = d.span;
        let raw = &d.value;
        let default_param = match raw.name.value.as_str() {
            "GONGAN" => Some("type"),
            "DYNAMICS" | "SEQUENCE" | "TEMPO" => Some("value"),
            "GOTO" => Some("label"),
            "KEMPLI" | "AUTOKEMPYUNG" => Some("status"),
            "LABEL" | "PART" => Some("name"),
            "OCTAVATE" => Some("instrument"),
            "REPEAT" => Some("count"),
            "SUPPRESS" => Some("positions"),
            "WAIT" => Some("seconds"),
            "VALIDATION" => None,
            other => {
                diags.err(
                    code::UNKNOWN_DIRECTIVE,
                    raw.name.span,
                    format!("unknown metadata keyword '{other}'"),
                );
                return None;
            }
        };
        let mut p = Params::new(diags, raw, span, default_param);
        let meta = match raw.name.value.as_str() {
            "GONGAN" => {
                let gongan_type = p.required_word(
                    "type",
                    "one of regular, kebyar, gineman",
                    GonganType::from_name,
                )?;
                MetaData::Gongan(GonganMeta { gongan_type })
            }
            "DYNAMICS" => {
                let value =
                    p.required_word("value", "one of pp, p, mp, mf, f, ff", DynamicLevel::from_name)?;
                MetaData::Dynamics(DynamicsMeta {
                    value,
                    positions: p.string_list("positions"),
                    first_beat: p.u32("first_beat", 1),
                    beat_count: p.u32("beat_count", 0),
                    passes: p.passes(),
                })
            }
            "GOTO" => MetaData::Goto(GotoMeta {
                label: p.required_string("label")?,
                from_beat: p.opt_u32("from_beat"),
                passes: p.passes(),
            }),
            "KEMPLI" => MetaData::Kempli(KempliMeta {
                status: p.switch("status")?,
                beats: p.beats(),
                scope: p.scope(),
            }),
            "AUTOKEMPYUNG" => MetaData::AutoKempyung(AutoKempyungMeta {
                status: p.switch("status")?,
                positions: p.string_list("positions"),
                scope: p.scope(),
            }),
            "LABEL" => MetaData::Label(LabelMeta {
                name: p.required_string("name")?,
                beat: p.u32("beat", 1),
            }),
            "OCTAVATE" => MetaData::Octavate(OctavateMeta {
                instrument: p.required_string("instrument")?,
                octaves: p.required_i32("octaves")?,
                scope: p.scope(),
            }),
            "PART" => MetaData::Part(PartMeta {
                name: p.required_string("name")?.value,
            }),
            "REPEAT" => {
                let count = p.required_u32("count")?;
                if count == 0 {
                    diags.err(code::REPEAT_COUNT, span, "repeat count must be at least 1");
                    return None;
                }
                MetaData::Repeat(RepeatMeta { count })
            }
            "SEQUENCE" => MetaData::Sequence(SequenceMeta {
                labels: {
                    let labels = p.string_list("value");
                    if labels.is_empty() {
                        diags.err(
                            code::MALFORMED_DIRECTIVE,
                            span,
                            "'SEQUENCE': missing required parameter 'value'",
                        );
                        return None;
                    }
                    labels
                },
            }),
            "SUPPRESS" => {
                let positions = p.string_list("positions");
                if positions.is_empty() {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        span,
                        "'SUPPRESS': missing required parameter 'positions'",
                    );
                    return None;
                }
                MetaData::Suppress(SuppressMeta {
                    positions,
                    beats: p.beats(),
                    passes: p.passes(),
                })
            }
            "TEMPO" => MetaData::Tempo(TempoMeta {
                value: p.required_u32("value")?,
                first_beat: p.u32("first_beat", 1),
                beat_count: p.u32("beat_count", 0),
                passes: p.passes(),
            }),
            "VALIDATION" => {
                let Some(v) = p.required("ignore") else {
                    return None;
                };
                let mut ignore = Vec::new();
                for item in v.value.as_list() {
                    match item.value.try_as_str().and_then(ValidationProperty::from_name) {
                        Some(prop) => ignore.push(prop),
                        None => diags.err(
                            code::MALFORMED_DIRECTIVE,
                            v.span,
                            "'VALIDATION': 'ignore' entries must be one of beat-duration, \
                             stave-length, instrument-range, kempyung",
                        ),
                    }
                }
                MetaData::Validation(ValidationMeta {
                    ignore,
                    beats: p.beats(),
                    scope: p.scope(),
                })
            }
            "WAIT" => {
                let seconds = p.required_f64("seconds")?;
                // The before-the-gongan variant exists in the notation format
                // but has never worked; reject it rather than misrender.
                if let Some(after) = p.take("after")
                    && after.value.try_as_str() != Some("true")
                {
                    diags.err(
                        code::UNSUPPORTED_DIRECTIVE,
                        after.span,
                        "'WAIT': after=false is not supported",
                    );
                    return None;
                }
                if seconds <= 0.0 {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        span,
                        "'WAIT': seconds must be positive",
                    );
                    return None;
                }
                MetaData::Wait(WaitMeta {
                    seconds,
                    passes: p.passes(),
                })
            }
            _ => unreachable!("keyword checked above"),
        };
        p.finish();
        Some(meta)
    }

    /// Renders the directive back to notation, writing only parameters that
    /// differ from their defaults.
    pub fn to_notation(&self) -> String {
        fn list(items: &[Spanned<String>]) -> String {
            let names: Vec<&str> = items.iter().map(|x| x.value.as_str()).collect();
            format!("[{}]", names.join(", "))
        }
        fn nums(items: &[u32]) -> String {
            let names: Vec<String> = items.iter().map(u32::to_string).collect();
            format!("[{}]", names.join(", "))
        }
        let mut out = format!("{{{}", self.keyword());
        match self {
            MetaData::AutoKempyung(x) => {
                write!(out, " {}", x.status).unwrap();
                if !x.positions.is_empty() {
                    write!(out, ", positions={}", list(&x.positions)).unwrap();
                }
                if x.scope != Scope::Gongan {
                    write!(out, ", scope={}", x.scope).unwrap();
                }
            }
            MetaData::Dynamics(x) => {
                write!(out, " {}", x.value).unwrap();
                if !x.positions.is_empty() {
                    write!(out, ", positions={}", list(&x.positions)).unwrap();
                }
                if x.first_beat != 1 {
                    write!(out, ", first_beat={}", x.first_beat).unwrap();
                }
                if x.beat_count != 0 {
                    write!(out, ", beat_count={}", x.beat_count).unwrap();
                }
                if !x.passes.is_all() {
                    write!(out, ", passes={}", nums(&x.passes.0)).unwrap();
                }
            }
            MetaData::Gongan(x) => write!(out, " {}", x.gongan_type).unwrap(),
            MetaData::Goto(x) => {
                write!(out, " {}", x.label.value).unwrap();
                if let Some(b) = x.from_beat {
                    write!(out, ", from_beat={b}").unwrap();
                }
                if !x.passes.is_all() {
                    write!(out, ", passes={}", nums(&x.passes.0)).unwrap();
                }
            }
            MetaData::Kempli(x) => {
                write!(out, " {}", x.status).unwrap();
                if !x.beats.0.is_empty() {
                    write!(out, ", beats={}", nums(&x.beats.0)).unwrap();
                }
                if x.scope != Scope::Gongan {
                    write!(out, ", scope={}", x.scope).unwrap();
                }
            }
            MetaData::Label(x) => {
                write!(out, " {}", x.name.value).unwrap();
                if x.beat != 1 {
                    write!(out, ", beat={}", x.beat).unwrap();
                }
            }
            MetaData::Octavate(x) => {
                write!(out, " {}, octaves={}", x.instrument.value, x.octaves).unwrap();
                if x.scope != Scope::Gongan {
                    write!(out, ", scope={}", x.scope).unwrap();
                }
            }
            MetaData::Part(x) => write!(out, " {}", x.name).unwrap(),
            MetaData::Repeat(x) => write!(out, " {}", x.count).unwrap(),
            MetaData::Sequence(x) => write!(out, " {}", list(&x.labels)).unwrap(),
            MetaData::Suppress(x) => {
                write!(out, " {}", list(&x.positions)).unwrap();
                if !x.beats.0.is_empty() {
                    write!(out, ", beats={}", nums(&x.beats.0)).unwrap();
                }
                if !x.passes.is_all() {
                    write!(out, ", passes={}", nums(&x.passes.0)).unwrap();
                }
            }
            MetaData::Tempo(x) => {
                write!(out, " {}", x.value).unwrap();
                if x.first_beat != 1 {
                    write!(out, ", first_beat={}", x.first_beat).unwrap();
                }
                if x.beat_count != 0 {
                    write!(out, ", beat_count={}", x.beat_count).unwrap();
                }
                if !x.passes.is_all() {
                    write!(out, ", passes={}", nums(&x.passes.0)).unwrap();
                }
            }
            MetaData::Validation(x) => {
                let props: Vec<&str> = x.ignore.iter().map(|p| p.name()).collect();
                write!(out, " ignore=[{}]", props.join(", ")).unwrap();
                if !x.beats.0.is_empty() {
                    write!(out, ", beats={}", nums(&x.beats.0)).unwrap();
                }
                if x.scope != Scope::Gongan {
                    write!(out, ", scope={}", x.scope).unwrap();
                }
            }
            MetaData::Wait(x) => {
                write!(out, " {}", x.seconds).unwrap();
                if !x.passes.is_all() {
                    write!(out, ", passes={}", nums(&x.passes.0)).unwrap();
                }
            }
        }
        out.push('}');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::model::RawParam;

    fn directive(name: &str, params: Vec<(Option<&str>, ParamValue)>) -> Spanned<RawDirective> {
        Spanned::new(
            0..1,
            RawDirective {
                name: Spanned::new(0..1, name),
                params: params
                    .into_iter()
                    .map(|(key, value)| RawParam {
                        key: key.map(|k| Spanned::new(0..1, k)),
                        value: Spanned::new(0..1, value),
                    })
                    .collect(),
            },
        )
    }

    #[test]
    fn test_positional_binds_default_param() {
        let diags = Diagnostics::new();
        let d = directive("TEMPO", vec![(None, ParamValue::Int(120))]);
        let meta = MetaData::from_raw(&diags, &d).unwrap();
        assert!(!diags.has_errors());
        assert_eq!(
            meta,
            MetaData::Tempo(TempoMeta {
                value: 120,
                first_beat: 1,
                beat_count: 0,
                passes: Passes::default(),
            })
        );
    }

    #[test]
    fn test_unknown_keyword() {
        let diags = Diagnostics::new();
        let d = directive("FROBNICATE", vec![]);
        assert!(MetaData::from_raw(&diags, &d).is_none());
        assert_eq!(diags.get_all()[0].code, code::UNKNOWN_DIRECTIVE);
    }

    #[test]
    fn test_unknown_parameter() {
        let diags = Diagnostics::new();
        let d = directive(
            "LABEL",
            vec![
                (None, ParamValue::Word("intro".into())),
                (Some("potato"), ParamValue::Int(1)),
            ],
        );
        MetaData::from_raw(&diags, &d);
        assert_eq!(diags.get_all()[0].code, code::MALFORMED_DIRECTIVE);
    }

    #[test]
    fn test_repeat_zero_rejected() {
        let diags = Diagnostics::new();
        let d = directive("REPEAT", vec![(None, ParamValue::Int(0))]);
        assert!(MetaData::from_raw(&diags, &d).is_none());
        assert_eq!(diags.get_all()[0].code, code::REPEAT_COUNT);
    }

    #[test]
    fn test_wait_before_unsupported() {
        let diags = Diagnostics::new();
        let d = directive(
            "WAIT",
            vec![
                (None, ParamValue::Float(2.5)),
                (Some("after"), ParamValue::Word("false".into())),
            ],
        );
        assert!(MetaData::from_raw(&diags, &d).is_none());
        assert_eq!(diags.get_all()[0].code, code::UNSUPPORTED_DIRECTIVE);
    }

    #[test]
    fn test_to_notation_skips_defaults() {
        let meta = MetaData::Tempo(TempoMeta {
            value: 120,
            first_beat: 1,
            beat_count: 4,
            passes: Passes(vec![2]),
        });
        assert_eq!(meta.to_notation(), "{TEMPO 120, beat_count=4, passes=[2]}");
    }
}
