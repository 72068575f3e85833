use faststr::FastStr;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Thread ids arrive either as JSON numbers or strings. Any other JSON value
/// still parses so the handler can answer with its own error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Number(Number),
    Text(FastStr),
    Other(Value),
}

impl ObjectId {
    fn to_key(&self) -> Option<FastStr> {
        match self {
            ObjectId::Number(n) => Some(number_key(n)),
            ObjectId::Text(s) => non_blank(s),
            ObjectId::Other(_) => None,
        }
    }
}

/// Integral values map to their integer text, so `7` and `7.0` name the same
/// thread. Fractional values keep their JSON text and match no thread.
fn number_key(n: &Number) -> FastStr {
    if let Some(i) = n.as_i64() {
        return i.to_string().into();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string().into();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string().into(),
        _ => n.to_string().into(),
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ViewCountRequest {
    #[serde(default)]
    pub chain:     Option<FastStr>,
    #[serde(default)]
    pub community: Option<FastStr>,
    #[serde(default)]
    pub object_id: Option<ObjectId>,
}

impl ViewCountRequest {
    pub fn object_key(&self) -> Option<FastStr> {
        self.object_id.as_ref().and_then(ObjectId::to_key)
    }

    /// `chain` takes precedence over `community`.
    pub fn community_key(&self) -> Option<FastStr> {
        self.chain
            .as_ref()
            .and_then(non_blank)
            .or_else(|| self.community.as_ref().and_then(non_blank))
    }
}

fn non_blank(s: &FastStr) -> Option<FastStr> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| FastStr::new(trimmed))
}
