use cogtask_core::{Key, Response, Side};
use winit::event::MouseButton;
use winit::keyboard::{KeyCode, PhysicalKey};

const CHAR_KEYS: [(KeyCode, char); 36] = [
    (KeyCode::KeyA, 'A'),
    (KeyCode::KeyB, 'B'),
    (KeyCode::KeyC, 'C'),
    (KeyCode::KeyD, 'D'),
    (KeyCode::KeyE, 'E'),
    (KeyCode::KeyF, 'F'),
    (KeyCode::KeyG, 'G'),
    (KeyCode::KeyH, 'H'),
    (KeyCode::KeyI, 'I'),
    (KeyCode::KeyJ, 'J'),
    (KeyCode::KeyK, 'K'),
    (KeyCode::KeyL, 'L'),
    (KeyCode::KeyM, 'M'),
    (KeyCode::KeyN, 'N'),
    (KeyCode::KeyO, 'O'),
    (KeyCode::KeyP, 'P'),
    (KeyCode::KeyQ, 'Q'),
    (KeyCode::KeyR, 'R'),
    (KeyCode::KeyS, 'S'),
    (KeyCode::KeyT, 'T'),
    (KeyCode::KeyU, 'U'),
    (KeyCode::KeyV, 'V'),
    (KeyCode::KeyW, 'W'),
    (KeyCode::KeyX, 'X'),
    (KeyCode::KeyY, 'Y'),
    (KeyCode::KeyZ, 'Z'),
    (KeyCode::Digit0, '0'),
    (KeyCode::Digit1, '1'),
    (KeyCode::Digit2, '2'),
    (KeyCode::Digit3, '3'),
    (KeyCode::Digit4, '4'),
    (KeyCode::Digit5, '5'),
    (KeyCode::Digit6, '6'),
    (KeyCode::Digit7, '7'),
    (KeyCode::Digit8, '8'),
    (KeyCode::Digit9, '9'),
];

/// Physical key position to response key; keys outside letters, digits,
/// space and escape are ignored.
pub fn key_response(key: PhysicalKey) -> Option<Response> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let key = match code {
        KeyCode::Space => Key::Space,
        KeyCode::Escape => Key::Escape,
        _ => CHAR_KEYS
            .iter()
            .find(|(k, _)| *k == code)
            .map(|(_, c)| Key::Char(*c))?,
    };
    Some(Response::Key(key))
}

pub fn click_response(button: MouseButton) -> Option<Response> {
    match button {
        MouseButton::Left => Some(Response::Click(Side::Left)),
        MouseButton::Right => Some(Response::Click(Side::Right)),
        _ => None,
    }
}
