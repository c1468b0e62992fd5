use std::ffi::{c_char, c_double, c_int, c_uint, CStr};
use std::path::{Path, PathBuf};

use libloading::Library;

use super::{AnalyzerError, AnalyzerParams, SpectrumAnalyzer};

/// Leading fields of cavacore's `struct cava_plan`. Only the header is read;
/// the rest of the plan stays opaque.
#[allow(dead_code)]
#[repr(C)]
struct CavaPlanHeader {
    fft_bass_buffer_size: c_int,
    fft_buffer_size: c_int,
    number_of_bars: c_int,
    audio_channels: c_int,
    input_buffer_size: c_int,
    rate: c_int,
    bass_cut_off_bar: c_int,
    sens_init: c_int,
    autosens: c_int,
    frame_skip: c_int,
    status: c_int,
    error_message: [c_char; 1024],
}

type CavaPlan = *mut CavaPlanHeader;
type CavaInitFn = unsafe extern "C" fn(
    c_int,
    c_uint,
    c_int,
    c_int,
    c_double,
    c_int,
    c_int,
) -> CavaPlan;
type CavaExecuteFn = unsafe extern "C" fn(*const c_double, c_int, *mut c_double, CavaPlan);
type CavaDestroyFn = unsafe extern "C" fn(CavaPlan);

/// The cavacore entry points, resolved once at startup.
pub struct CavaLibrary {
    _lib: Library,
    init: CavaInitFn,
    execute: CavaExecuteFn,
    destroy: CavaDestroyFn,
    path: PathBuf,
}

fn candidate_names() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["libcavacore.dylib"]
    } else {
        &["libcavacore.so", "libcavacore.so.0"]
    }
}

/// Explicit path first, then next to the executable, then the loader's search path.
fn library_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    {
        for name in candidate_names() {
            candidates.push(exe_dir.join(name));
        }
    }
    for name in candidate_names() {
        candidates.push(PathBuf::from(name));
    }
    candidates
}

impl CavaLibrary {
    /// Load the library and resolve all three symbols. A library that loads
    /// but lacks a symbol is an error here, not at the first execute.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AnalyzerError> {
        let mut last_error = String::from("no candidate paths");
        let mut last_path = PathBuf::from(candidate_names()[0]);
        for path in library_candidates(explicit) {
            match unsafe { Self::load_from(&path) } {
                Ok(lib) => {
                    log::info!("Loaded cavacore from {}", lib.path.display());
                    return Ok(lib);
                }
                Err(err) => {
                    log::debug!("cavacore candidate {} rejected: {}", path.display(), err);
                    last_error = err;
                    last_path = path;
                }
            }
        }
        Err(AnalyzerError::Load { path: last_path, reason: last_error })
    }

    unsafe fn load_from(path: &Path) -> Result<Self, String> {
        let lib = Library::new(path).map_err(|e| e.to_string())?;
        let init = *lib
            .get::<CavaInitFn>(b"cava_init\0")
            .map_err(|e| format!("cava_init: {e}"))?;
        let execute = *lib
            .get::<CavaExecuteFn>(b"cava_execute\0")
            .map_err(|e| format!("cava_execute: {e}"))?;
        let destroy = *lib
            .get::<CavaDestroyFn>(b"cava_destroy\0")
            .map_err(|e| format!("cava_destroy: {e}"))?;
        Ok(Self {
            _lib: lib,
            init,
            execute,
            destroy,
            path: path.to_path_buf(),
        })
    }

    /// Run `cava_execute` with no checks of its own.
    ///
    /// # Safety
    ///
    /// - `plan` must come from `cava_init` on this library and not yet be destroyed.
    /// - `input` is read for `input.len()` samples; cavacore consumes at most
    ///   its configured input buffer per call, which is sized from the rate and
    ///   channel count it was initialized with.
    /// - `output` must hold at least `number_of_bars * audio_channels` values
    ///   of the plan; cavacore writes that many unconditionally.
    /// - The plan must not be used from two threads at once.
    unsafe fn execute_raw(&self, plan: CavaPlan, input: &[f64], output: &mut [f64]) {
        (self.execute)(input.as_ptr(), input.len() as c_int, output.as_mut_ptr(), plan);
    }
}

/// A cavacore plan. The plan pointer is owned exclusively and destroyed on drop.
pub struct CavaAnalyzer {
    lib: CavaLibrary,
    plan: CavaPlan,
    params: AnalyzerParams,
}

// The plan is only ever touched through `&mut self`, and the session moves
// into the capture thread once; cavacore keeps no thread-local state.
unsafe impl Send for CavaAnalyzer {}

impl CavaAnalyzer {
    pub fn new(lib: CavaLibrary, params: AnalyzerParams) -> Result<Self, AnalyzerError> {
        let plan = unsafe {
            (lib.init)(
                params.bar_count as c_int,
                params.sample_rate as c_uint,
                params.channels as c_int,
                params.autosens as c_int,
                params.noise_reduction as c_double,
                params.low_cut_off as c_int,
                params.high_cut_off as c_int,
            )
        };
        if plan.is_null() {
            return Err(AnalyzerError::Init("cava_init returned no plan".into()));
        }

        let status = unsafe { (*plan).status };
        if status != 0 {
            let message = unsafe {
                CStr::from_ptr((*plan).error_message.as_ptr())
                    .to_string_lossy()
                    .into_owned()
            };
            unsafe { (lib.destroy)(plan) };
            return Err(AnalyzerError::Init(format!("cava_init status {status}: {message}")));
        }

        let header = unsafe { &*plan };
        log::debug!(
            "cava plan: fft={} bass_fft={} input_buffer={} bass_cut_bar={}",
            header.fft_buffer_size,
            header.fft_bass_buffer_size,
            header.input_buffer_size,
            header.bass_cut_off_bar
        );

        Ok(Self { lib, plan, params })
    }
}

impl SpectrumAnalyzer for CavaAnalyzer {
    fn params(&self) -> &AnalyzerParams {
        &self.params
    }

    fn execute(&mut self, input: &[f64], output: &mut [f64]) {
        assert_eq!(
            output.len(),
            self.params.output_len(),
            "cava output buffer must hold bars * channels values"
        );
        unsafe { self.lib.execute_raw(self.plan, input, output) }
    }
}

impl Drop for CavaAnalyzer {
    fn drop(&mut self) {
        unsafe { (self.lib.destroy)(self.plan) }
        log::debug!("cava plan destroyed");
    }
}
