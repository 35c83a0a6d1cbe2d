//! macOS tree provider on top of the AX API (objc2-application-services).
//!
//! Attribute reads cross an FFI boundary that can stall when the target
//! application's run loop is busy, so every read is wrapped in an
//! elapsed-time guard. Tree building caps depth and per-node children and
//! tracks visited elements, since real AX trees contain cycles.

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::time::{Duration, Instant};

use chrono::Utc;
use libc::pid_t;
use objc2_app_kit::{NSRunningApplication, NSWorkspace};
use objc2_application_services::{AXError, AXUIElement};
use objc2_core_foundation::{CFArray, CFBoolean, CFRetained, CFString, CFType};
use tracing::{debug, warn};

use crate::element::{NodeId, UiBounds, UiNode};
use crate::permissions::PermissionLevel;
use crate::provider::{AppConnection, ProviderError, TreeProvider};
use crate::snapshot::UiSnapshot;

const ATTRIBUTE_READ_BUDGET: Duration = Duration::from_millis(500);
const MAX_DEPTH: usize = 25;
const MAX_CHILDREN_PER_NODE: usize = 50;

pub struct MacTreeProvider;

impl MacTreeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacTreeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeProvider for MacTreeProvider {
    fn probe_trust(&self) -> PermissionLevel {
        if unsafe { AXIsProcessTrusted() } {
            PermissionLevel::Full
        } else {
            PermissionLevel::None
        }
    }

    fn frontmost_app(&self) -> Result<String, ProviderError> {
        let workspace = unsafe { NSWorkspace::sharedWorkspace() };
        let app = unsafe { workspace.frontmostApplication() }
            .ok_or(ProviderError::NoFrontmostApp)?;
        unsafe { app.localizedName() }
            .map(|name| name.to_string())
            .ok_or(ProviderError::NoFrontmostApp)
    }

    fn connect(&self, app: &str) -> Result<AppConnection, ProviderError> {
        let pid = find_running_app(app)
            .ok_or_else(|| ProviderError::AppNotFound(app.to_string()))?;
        Ok(AppConnection {
            app: app.to_string(),
            pid: Some(pid),
        })
    }

    fn snapshot(&self, connection: &AppConnection) -> Result<UiSnapshot, ProviderError> {
        let pid = connection
            .pid
            .ok_or_else(|| ProviderError::AppNotFound(connection.app.clone()))?;
        let root = unsafe { AXUIElement::new_application(pid as pid_t) };

        let mut nodes = HashMap::new();
        let mut focused = None;
        let mut visited = HashSet::new();
        let started = Instant::now();

        let root_id = build_node(&root, &mut nodes, &mut focused, &mut visited, 0)?;

        debug!(
            app = %connection.app,
            nodes = nodes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "accessibility snapshot built"
        );

        Ok(UiSnapshot {
            app: connection.app.clone(),
            captured_at: Utc::now(),
            root: root_id,
            nodes,
            focused,
        })
    }

    fn screen_size(&self) -> (f64, f64) {
        unsafe {
            let display = CGMainDisplayID();
            (
                CGDisplayPixelsWide(display) as f64,
                CGDisplayPixelsHigh(display) as f64,
            )
        }
    }
}

fn find_running_app(name: &str) -> Option<i32> {
    let workspace = unsafe { NSWorkspace::sharedWorkspace() };

    if let Some(front) = unsafe { workspace.frontmostApplication() } {
        if matches_name(&front, name) {
            return Some(unsafe { front.processIdentifier() } as i32);
        }
    }

    let running = unsafe { workspace.runningApplications() };
    for app in running.iter() {
        if matches_name(&app, name) {
            return Some(unsafe { app.processIdentifier() } as i32);
        }
    }
    None
}

fn matches_name(app: &NSRunningApplication, name: &str) -> bool {
    unsafe { app.localizedName() }
        .map(|n| n.to_string().eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

fn build_node(
    element: &AXUIElement,
    nodes: &mut HashMap<NodeId, UiNode>,
    focused: &mut Option<NodeId>,
    visited: &mut HashSet<NodeId>,
    depth: usize,
) -> Result<NodeId, ProviderError> {
    let mut node = read_node(element, nodes.len())?;
    let id = node.id;

    if !visited.insert(id) {
        // Cycle: the node is already in the map or on its way there.
        if !nodes.contains_key(&id) {
            nodes.insert(id, node);
        }
        return Ok(id);
    }

    if depth >= MAX_DEPTH {
        warn!(depth, "accessibility tree exceeded max depth; truncating");
        nodes.insert(id, node);
        return Ok(id);
    }

    let children = read_children(element);
    let truncated = children.len() > MAX_CHILDREN_PER_NODE;
    if truncated {
        debug!(
            count = children.len(),
            cap = MAX_CHILDREN_PER_NODE,
            "capping children for one node"
        );
    }

    let mut child_ids = Vec::new();
    for child in children.into_iter().take(MAX_CHILDREN_PER_NODE) {
        match build_node(&child, nodes, focused, visited, depth + 1) {
            Ok(child_id) => {
                if !child_ids.contains(&child_id) {
                    child_ids.push(child_id);
                }
            }
            Err(e) => {
                debug!(depth, error = %e, "skipping unreadable child");
            }
        }
    }

    if is_focused(element) {
        *focused = Some(id);
    }
    node.children = child_ids;
    nodes.insert(id, node);
    Ok(id)
}

/// Read the searchable attributes for one element. The `ordinal` feeds
/// the id hash so two otherwise identical siblings stay distinct.
fn read_node(element: &AXUIElement, ordinal: usize) -> Result<UiNode, ProviderError> {
    let role = guarded_string(element, "AXRole")?
        .ok_or_else(|| ProviderError::TreeBuild("element has no role".to_string()))?;
    let title = guarded_string(element, "AXTitle")?;
    let description = guarded_string(element, "AXDescription")?;
    let value = guarded_string(element, "AXValue")?;
    let help = guarded_string(element, "AXHelp")?;
    let enabled = guarded_bool(element, "AXEnabled").unwrap_or(true);
    let bounds = read_bounds(element);

    let id = hash_identity(&role, title.as_deref(), &bounds, ordinal);

    Ok(UiNode {
        id,
        role,
        title,
        description,
        value,
        help,
        enabled,
        bounds,
        children: Vec::new(),
    })
}

fn hash_identity(
    role: &str,
    title: Option<&str>,
    bounds: &Option<UiBounds>,
    ordinal: usize,
) -> NodeId {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    role.hash(&mut hasher);
    title.hash(&mut hasher);
    if let Some(b) = bounds {
        b.x.to_bits().hash(&mut hasher);
        b.y.to_bits().hash(&mut hasher);
        b.width.to_bits().hash(&mut hasher);
        b.height.to_bits().hash(&mut hasher);
    } else {
        ordinal.hash(&mut hasher);
    }
    NodeId(hasher.finish())
}

fn is_focused(element: &AXUIElement) -> bool {
    guarded_bool(element, "AXFocused").unwrap_or(false)
}

fn read_children(element: &AXUIElement) -> Vec<CFRetained<AXUIElement>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for attr in ["AXWindows", "AXChildren"] {
        let Ok(Some(array)) = guarded_array(element, attr) else {
            continue;
        };
        let count = array.count();
        for idx in 0..(count as usize) {
            let child_ref = unsafe { array.value_at_index(idx as _) };
            let Some(non_null) = NonNull::new(child_ref as *mut AXUIElement) else {
                continue;
            };
            if seen.insert(non_null.as_ptr() as usize) {
                out.push(unsafe { (*non_null.as_ptr()).retain() });
            }
        }
    }
    out
}

fn read_bounds(element: &AXUIElement) -> Option<UiBounds> {
    let position = read_ax_value(element, "AXPosition", K_AXVALUE_CGPOINT_TYPE)?;
    let size = read_ax_value(element, "AXSize", K_AXVALUE_CGSIZE_TYPE)?;
    let bounds = UiBounds::new(position.0, position.1, size.0, size.1);
    bounds.is_finite().then_some(bounds)
}

// Attribute readers. Each measures elapsed time around the FFI call; a
// read that blows the budget fails the element rather than the whole
// snapshot, and a warning marks the misbehaving attribute.

fn guarded_string(
    element: &AXUIElement,
    attr_name: &str,
) -> Result<Option<String>, ProviderError> {
    let started = Instant::now();
    let result = copy_attribute(element, attr_name);
    check_budget(attr_name, started)?;

    match result {
        Ok(value) => Ok(value
            .downcast_ref::<CFString>()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())),
        Err(AXError::NoValue) | Err(AXError::AttributeUnsupported) => Ok(None),
        Err(_) => Ok(None),
    }
}

fn guarded_bool(element: &AXUIElement, attr_name: &str) -> Option<bool> {
    let started = Instant::now();
    let result = copy_attribute(element, attr_name);
    if check_budget(attr_name, started).is_err() {
        return None;
    }
    result
        .ok()
        .and_then(|value| value.downcast_ref::<CFBoolean>().map(|b| b.as_bool()))
}

fn guarded_array(
    element: &AXUIElement,
    attr_name: &str,
) -> Result<Option<CFRetained<CFArray>>, ProviderError> {
    let started = Instant::now();
    let result = copy_attribute(element, attr_name);
    check_budget(attr_name, started)?;

    match result {
        Ok(value) => {
            if value.downcast_ref::<CFArray>().is_some() {
                let ptr = value.as_ref() as *const CFType as *const CFArray;
                Ok(Some(unsafe { (*ptr).retain() }))
            } else {
                Ok(None)
            }
        }
        Err(_) => Ok(None),
    }
}

fn check_budget(attr_name: &str, started: Instant) -> Result<(), ProviderError> {
    let elapsed = started.elapsed();
    if elapsed > ATTRIBUTE_READ_BUDGET {
        warn!(
            attribute = attr_name,
            elapsed_ms = elapsed.as_millis() as u64,
            "attribute read exceeded its budget"
        );
        return Err(ProviderError::AttributeTimeout(
            ATTRIBUTE_READ_BUDGET.as_millis() as u64,
        ));
    }
    Ok(())
}

fn copy_attribute(
    element: &AXUIElement,
    attr_name: &str,
) -> Result<CFRetained<CFType>, AXError> {
    let attr_cf_string = CFString::from_str(attr_name);
    let mut value_ptr: *const CFType = std::ptr::null();
    let Some(value_out) =
        NonNull::new(&mut value_ptr as *mut *const CFType as *mut *const CFType)
    else {
        return Err(AXError::Failure);
    };

    unsafe {
        let error = element.copy_attribute_value(&attr_cf_string, value_out);
        if error != AXError::Success {
            return Err(error);
        }
    }

    let non_null = NonNull::new(value_ptr as *mut CFType).ok_or(AXError::NoValue)?;
    Ok(unsafe { CFRetained::from_raw(non_null) })
}

fn read_ax_value(element: &AXUIElement, attr_name: &str, value_type: u32) -> Option<(f64, f64)> {
    use std::os::raw::c_void;

    let started = Instant::now();
    let value = copy_attribute(element, attr_name).ok()?;
    if check_budget(attr_name, started).is_err() {
        return None;
    }

    unsafe {
        let value_ref = value.as_ref() as *const CFType as *const c_void;
        let mut pair = CGPair { a: 0.0, b: 0.0 };
        let pair_ptr = &mut pair as *mut CGPair as *mut c_void;
        if AXValueGetValue(value_ref, value_type, pair_ptr) != 0 {
            Some((pair.a, pair.b))
        } else {
            None
        }
    }
}

// Constants from Apple's AXValue.h
const K_AXVALUE_CGPOINT_TYPE: u32 = 1;
const K_AXVALUE_CGSIZE_TYPE: u32 = 2;

/// CGPoint and CGSize share this layout: two doubles.
#[repr(C)]
struct CGPair {
    a: f64,
    b: f64,
}

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXValueGetValue(value: *const std::os::raw::c_void, type_: u32, ptr: *mut std::os::raw::c_void) -> i32;
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGMainDisplayID() -> u32;
    fn CGDisplayPixelsWide(display: u32) -> usize;
    fn CGDisplayPixelsHigh(display: u32) -> usize;
}
