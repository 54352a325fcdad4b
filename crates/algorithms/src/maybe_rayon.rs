//! Row-parallel execution with an optional rayon backend.
//!
//! With the `parallel` feature, `into_par_iter()` is rayon's. Without it, a
//! sequential stand-in resolves the same chains (`.map()`, `.flat_map()`,
//! `.collect()`) to plain `Iterator` methods.

use ndarray::Array2;

use erosgis_core::{Error, Raster, Result};

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;

/// Build a `rows x cols` output by filling each row independently.
///
/// `fill_row(row, out)` receives a row buffer pre-set to `NaN`; cells it
/// leaves untouched stay no-data. The result carries `like`'s georeference.
pub(crate) fn build_rows<F>(like: &Raster<f64>, fill_row: F) -> Result<Raster<f64>>
where
    F: Fn(usize, &mut [f64]) + Sync + Send,
{
    let (rows, cols) = like.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            fill_row(row, &mut row_data);
            row_data
        })
        .collect();

    let mut output = like.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
