//! Values passed between decoder, transforms and encoder.

use ifcx_model::TabularModel;

/// Structured `{columns, rows, relations}` shape.
pub const TABULAR: &str = "tabular";

/// Pass-through of the raw IFC bytes.
pub const RAW_IFC: &str = "ifc";

#[derive(Debug, Clone)]
pub enum ConvertData {
    Bytes(Vec<u8>),
    Tabular(TabularModel),
}

impl ConvertData {
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertData::Bytes(_) => "bytes",
            ConvertData::Tabular(_) => TABULAR,
        }
    }

    pub fn as_tabular_mut(&mut self) -> Option<&mut TabularModel> {
        match self {
            ConvertData::Tabular(model) => Some(model),
            ConvertData::Bytes(_) => None,
        }
    }

    pub fn into_tabular(self) -> Option<TabularModel> {
        match self {
            ConvertData::Tabular(model) => Some(model),
            ConvertData::Bytes(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            ConvertData::Bytes(bytes) => Some(bytes),
            ConvertData::Tabular(_) => None,
        }
    }
}

impl From<TabularModel> for ConvertData {
    fn from(model: TabularModel) -> Self {
        ConvertData::Tabular(model)
    }
}

impl From<Vec<u8>> for ConvertData {
    fn from(bytes: Vec<u8>) -> Self {
        ConvertData::Bytes(bytes)
    }
}
