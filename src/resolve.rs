use crate::aes::Mapping;
use crate::data::RowTable;
use crate::error::Result;
use crate::parser::ast::{Layer, LayerData, PlotSpec};
use log::debug;

/// A layer with its data source and aesthetic mapping settled.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    /// Position of the layer in the plot
    pub index: usize,
    pub data: RowTable,
    pub mapping: Mapping,
}

/// Resolve data and mappings for every layer of the plot
pub fn resolve_plot(spec: &PlotSpec, data: &RowTable) -> Result<Vec<ResolvedLayer>> {
    spec.layers
        .iter()
        .enumerate()
        .map(|(index, layer)| {
            Ok(ResolvedLayer {
                index,
                data: resolve_layer_data(layer, data)?,
                mapping: resolve_layer_mapping(layer, &spec.mapping),
            })
        })
        .collect()
}

/// Layer table verbatim, else the layer function over the default data, else
/// the default data.
pub fn resolve_layer_data(layer: &Layer, default: &RowTable) -> Result<RowTable> {
    let table = match &layer.data {
        LayerData::Table(table) => table.clone(),
        LayerData::Json(value) => RowTable::from_json(value)?,
        LayerData::Function(f) => f.apply(default)?,
        LayerData::Inherit => default.clone(),
    };
    table.validate()?;
    debug!("layer '{}' resolved {} row(s)", layer.geom.name(), table.nrow());
    Ok(table)
}

/// Layer mapping over the global one (unless `inherit_aes` is off), then the
/// stat's default after-stat aesthetics for anything still unmapped.
pub fn resolve_layer_mapping(layer: &Layer, global: &Mapping) -> Mapping {
    let mut mapping = if layer.inherit_aes {
        layer.mapping.overlaid_on(global)
    } else {
        layer.mapping.clone()
    };
    for (aes, expr) in layer.stat.default_aes() {
        if !mapping.contains(aes) && !layer.params.contains_key(&aes) {
            mapping.insert(aes, expr);
        }
    }
    mapping
}
