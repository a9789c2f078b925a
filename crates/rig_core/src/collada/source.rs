//! Shared readers for `<source>`, `<input>` and whitespace-separated arrays.
//!
//! Errors are plain messages; each extractor wraps them into the error kind
//! that fits its failure policy.

use crate::xml::XmlNode;

/// Strip the leading `#` of a local URL fragment.
pub(crate) fn strip_hash(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}

pub(crate) fn parse_floats(text: &str) -> Result<Vec<f32>, String> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<f32>()
                .map_err(|_| format!("invalid number '{}'", token))
        })
        .collect()
}

pub(crate) fn parse_indices(text: &str) -> Result<Vec<usize>, String> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| format!("invalid index '{}'", token))
        })
        .collect()
}

/// Float data of a `<source>` with the stride of its accessor.
#[derive(Clone, Debug)]
pub(crate) struct FloatSource {
    pub data: Vec<f32>,
    pub stride: usize,
}

impl FloatSource {
    pub fn count(&self) -> usize {
        self.data.len() / self.stride
    }

    /// Element `index` as a slice of `stride` floats.
    pub fn get(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.stride)?;
        self.data.get(start..start.checked_add(self.stride)?)
    }
}

/// Find `<source id="...">` among the children of `parent`.
pub(crate) fn find_source<'a>(parent: &'a XmlNode, url: &str) -> Option<&'a XmlNode> {
    parent.child_with_attribute("source", "id", strip_hash(url))
}

fn accessor_stride(source: &XmlNode) -> Result<usize, String> {
    let stride = match source.find(&["technique_common", "accessor"]) {
        Some(accessor) => accessor
            .parse_attribute::<usize>("stride")
            .map_err(|e| e.to_string())?
            .unwrap_or(1),
        None => 1,
    };
    if stride == 0 {
        return Err("accessor stride is 0".to_string());
    }
    Ok(stride)
}

/// Read the `<float_array>` of a source and check it against its declared
/// count and accessor.
pub(crate) fn read_float_source(source: &XmlNode) -> Result<FloatSource, String> {
    let id = source.attribute("id").unwrap_or("?");
    let array = source
        .child("float_array")
        .ok_or_else(|| format!("source {} has no float_array", id))?;
    let data = parse_floats(array.text())?;

    if let Some(count) = array.parse_attribute::<usize>("count").map_err(|e| e.to_string())? {
        if count != data.len() {
            return Err(format!(
                "source {} declares {} floats but holds {}",
                id,
                count,
                data.len()
            ));
        }
    }

    let stride = accessor_stride(source)?;
    if data.len() % stride != 0 {
        return Err(format!(
            "source {} holds {} floats, not a multiple of stride {}",
            id,
            data.len(),
            stride
        ));
    }

    if let Some(accessor) = source.find(&["technique_common", "accessor"]) {
        if let Some(count) = accessor.parse_attribute::<usize>("count").map_err(|e| e.to_string())? {
            if count.checked_mul(stride).map_or(true, |wanted| wanted > data.len()) {
                return Err(format!(
                    "source {} accessor wants {} elements, array has {}",
                    id,
                    count,
                    data.len() / stride
                ));
            }
        }
    }

    Ok(FloatSource { data, stride })
}

/// Read the `<Name_array>` (or `<IDREF_array>`) of a source.
pub(crate) fn read_name_source(source: &XmlNode) -> Result<Vec<String>, String> {
    let array = source
        .child("Name_array")
        .or_else(|| source.child("IDREF_array"))
        .ok_or_else(|| {
            format!(
                "source {} has no Name_array",
                source.attribute("id").unwrap_or("?")
            )
        })?;
    Ok(array.text().split_whitespace().map(str::to_string).collect())
}

/// One `<input>` of a primitive, skin or sampler.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Input<'a> {
    pub semantic: &'a str,
    pub source: &'a str,
    pub offset: usize,
    pub set: Option<usize>,
}

pub(crate) fn read_inputs(node: &XmlNode) -> Result<Vec<Input<'_>>, String> {
    node.children("input")
        .map(|input| {
            Ok(Input {
                semantic: input.attribute("semantic").unwrap_or(""),
                source: strip_hash(input.attribute("source").unwrap_or("")),
                offset: input
                    .parse_attribute::<usize>("offset")
                    .map_err(|e| e.to_string())?
                    .unwrap_or(0),
                set: input.parse_attribute::<usize>("set").map_err(|e| e.to_string())?,
            })
        })
        .collect()
}

/// Indices per corner in a stream shared by `inputs`: the highest offset
/// plus one.
pub(crate) fn input_stride(inputs: &[Input<'_>]) -> Result<usize, String> {
    let highest = inputs.iter().map(|input| input.offset).max().unwrap_or(0);
    highest
        .checked_add(1)
        .ok_or_else(|| format!("input offset {} is too large", highest))
}
