use std::collections::HashSet;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

impl KeyStroke {
    const fn plain(keycode: u32) -> Self {
        Self {
            keycode,
            shift: false,
        }
    }

    const fn shifted(keycode: u32) -> Self {
        Self {
            keycode,
            shift: true,
        }
    }
}

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_ESC: u32 = 1;

pub const KEY_1: u32 = 2;
pub const KEY_2: u32 = 3;
pub const KEY_3: u32 = 4;
pub const KEY_4: u32 = 5;
pub const KEY_5: u32 = 6;
pub const KEY_6: u32 = 7;
pub const KEY_7: u32 = 8;
pub const KEY_8: u32 = 9;
pub const KEY_9: u32 = 10;
pub const KEY_0: u32 = 11;

pub const KEY_MINUS: u32 = 12;
pub const KEY_EQUAL: u32 = 13;
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;

pub const KEY_Q: u32 = 16;
pub const KEY_W: u32 = 17;
pub const KEY_E: u32 = 18;
pub const KEY_R: u32 = 19;
pub const KEY_T: u32 = 20;
pub const KEY_Y: u32 = 21;
pub const KEY_U: u32 = 22;
pub const KEY_I: u32 = 23;
pub const KEY_O: u32 = 24;
pub const KEY_P: u32 = 25;

pub const KEY_LEFTBRACE: u32 = 26;
pub const KEY_RIGHTBRACE: u32 = 27;
pub const KEY_ENTER: u32 = 28;

pub const KEY_LEFTCTRL: u32 = 29;

pub const KEY_A: u32 = 30;
pub const KEY_S: u32 = 31;
pub const KEY_D: u32 = 32;
pub const KEY_F: u32 = 33;
pub const KEY_G: u32 = 34;
pub const KEY_H: u32 = 35;
pub const KEY_J: u32 = 36;
pub const KEY_K: u32 = 37;
pub const KEY_L: u32 = 38;

pub const KEY_SEMICOLON: u32 = 39;
pub const KEY_APOSTROPHE: u32 = 40;
pub const KEY_GRAVE: u32 = 41;

pub const KEY_LEFTSHIFT: u32 = 42;

pub const KEY_BACKSLASH: u32 = 43;

pub const KEY_Z: u32 = 44;
pub const KEY_X: u32 = 45;
pub const KEY_C: u32 = 46;
pub const KEY_V: u32 = 47;
pub const KEY_B: u32 = 48;
pub const KEY_N: u32 = 49;
pub const KEY_M: u32 = 50;

pub const KEY_COMMA: u32 = 51;
pub const KEY_DOT: u32 = 52;
pub const KEY_SLASH: u32 = 53;

pub const KEY_RIGHTSHIFT: u32 = 54;

pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;
pub const KEY_CAPSLOCK: u32 = 58;

pub const KEY_F1: u32 = 59;
pub const KEY_F2: u32 = 60;
pub const KEY_F3: u32 = 61;
pub const KEY_F4: u32 = 62;
pub const KEY_F5: u32 = 63;
pub const KEY_F6: u32 = 64;
pub const KEY_F7: u32 = 65;
pub const KEY_F8: u32 = 66;
pub const KEY_F9: u32 = 67;
pub const KEY_F10: u32 = 68;
pub const KEY_F11: u32 = 87;
pub const KEY_F12: u32 = 88;

pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

pub const KEY_HOME: u32 = 102;
pub const KEY_UP: u32 = 103;
pub const KEY_PAGEUP: u32 = 104;
pub const KEY_LEFT: u32 = 105;
pub const KEY_RIGHT: u32 = 106;
pub const KEY_END: u32 = 107;
pub const KEY_DOWN: u32 = 108;
pub const KEY_PAGEDOWN: u32 = 109;
pub const KEY_INSERT: u32 = 110;
pub const KEY_DELETE: u32 = 111;

pub const KEY_LEFTMETA: u32 = 125;

const LETTERS: [(char, u32); 26] = [
    ('a', KEY_A),
    ('b', KEY_B),
    ('c', KEY_C),
    ('d', KEY_D),
    ('e', KEY_E),
    ('f', KEY_F),
    ('g', KEY_G),
    ('h', KEY_H),
    ('i', KEY_I),
    ('j', KEY_J),
    ('k', KEY_K),
    ('l', KEY_L),
    ('m', KEY_M),
    ('n', KEY_N),
    ('o', KEY_O),
    ('p', KEY_P),
    ('q', KEY_Q),
    ('r', KEY_R),
    ('s', KEY_S),
    ('t', KEY_T),
    ('u', KEY_U),
    ('v', KEY_V),
    ('w', KEY_W),
    ('x', KEY_X),
    ('y', KEY_Y),
    ('z', KEY_Z),
];

// (unshifted, shifted, keycode)
const SYMBOL_KEYS: [(char, char, u32); 21] = [
    ('1', '!', KEY_1),
    ('2', '@', KEY_2),
    ('3', '#', KEY_3),
    ('4', '$', KEY_4),
    ('5', '%', KEY_5),
    ('6', '^', KEY_6),
    ('7', '&', KEY_7),
    ('8', '*', KEY_8),
    ('9', '(', KEY_9),
    ('0', ')', KEY_0),
    ('-', '_', KEY_MINUS),
    ('=', '+', KEY_EQUAL),
    ('[', '{', KEY_LEFTBRACE),
    (']', '}', KEY_RIGHTBRACE),
    ('\\', '|', KEY_BACKSLASH),
    (';', ':', KEY_SEMICOLON),
    ('\'', '"', KEY_APOSTROPHE),
    ('`', '~', KEY_GRAVE),
    (',', '<', KEY_COMMA),
    ('.', '>', KEY_DOT),
    ('/', '?', KEY_SLASH),
];

const NAMED_KEYS: [(&str, u32); 30] = [
    ("enter", KEY_ENTER),
    ("return", KEY_ENTER),
    ("esc", KEY_ESC),
    ("escape", KEY_ESC),
    ("tab", KEY_TAB),
    ("space", KEY_SPACE),
    ("backspace", KEY_BACKSPACE),
    ("delete", KEY_DELETE),
    ("del", KEY_DELETE),
    ("insert", KEY_INSERT),
    ("up", KEY_UP),
    ("down", KEY_DOWN),
    ("left", KEY_LEFT),
    ("right", KEY_RIGHT),
    ("home", KEY_HOME),
    ("end", KEY_END),
    ("pageup", KEY_PAGEUP),
    ("pagedown", KEY_PAGEDOWN),
    ("capslock", KEY_CAPSLOCK),
    ("shift", KEY_LEFTSHIFT),
    ("shiftleft", KEY_LEFTSHIFT),
    ("shiftright", KEY_RIGHTSHIFT),
    ("ctrl", KEY_LEFTCTRL),
    ("ctrlleft", KEY_LEFTCTRL),
    ("ctrlright", KEY_RIGHTCTRL),
    ("alt", KEY_LEFTALT),
    ("altleft", KEY_LEFTALT),
    ("altright", KEY_RIGHTALT),
    ("win", KEY_LEFTMETA),
    ("super", KEY_LEFTMETA),
];

const FUNCTION_KEYS: [u32; 12] = [
    KEY_F1, KEY_F2, KEY_F3, KEY_F4, KEY_F5, KEY_F6, KEY_F7, KEY_F8, KEY_F9, KEY_F10, KEY_F11,
    KEY_F12,
];

pub fn typed_char_for_output_char(c: char) -> Option<char> {
    match c {
        '\n' | '\t' => Some(c),
        '\r' => None,

        // Smart quotes are common in docs. Many editors auto-substitute them back
        // from the ASCII keystrokes.
        '’' | '‘' => Some('\''),
        '”' | '“' => Some('"'),

        c if c.is_ascii_graphic() || c == ' ' => Some(c),
        _ => None,
    }
}

pub fn keystroke_for_output_char(c: char) -> Option<KeyStroke> {
    typed_char_for_output_char(c).and_then(char_to_keystroke)
}

pub fn char_to_keystroke(c: char) -> Option<KeyStroke> {
    match c {
        ' ' => return Some(KeyStroke::plain(KEY_SPACE)),
        '\n' => return Some(KeyStroke::plain(KEY_ENTER)),
        '\t' => return Some(KeyStroke::plain(KEY_TAB)),
        _ => {}
    }

    if c.is_ascii_alphabetic() {
        let lower = c.to_ascii_lowercase();
        let (_, keycode) = LETTERS.iter().find(|(l, _)| *l == lower)?;
        return Some(if c.is_ascii_uppercase() {
            KeyStroke::shifted(*keycode)
        } else {
            KeyStroke::plain(*keycode)
        });
    }

    SYMBOL_KEYS.iter().find_map(|(plain, shifted, keycode)| {
        if c == *plain {
            Some(KeyStroke::plain(*keycode))
        } else if c == *shifted {
            Some(KeyStroke::shifted(*keycode))
        } else {
            None
        }
    })
}

/// Resolve a macro/host key identifier such as `enter`, `f5` or `a`.
pub fn keystroke_for_name(name: &str) -> Option<KeyStroke> {
    if let Some((_, keycode)) = NAMED_KEYS.iter().find(|(n, _)| *n == name) {
        return Some(KeyStroke::plain(*keycode));
    }

    if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<usize>().ok()) {
        if (1..=FUNCTION_KEYS.len()).contains(&n) {
            return Some(KeyStroke::plain(FUNCTION_KEYS[n - 1]));
        }
    }

    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_ascii_uppercase() => char_to_keystroke(c),
        _ => None,
    }
}

/// Every identifier `keystroke_for_name` accepts.
pub fn known_key_names() -> HashSet<String> {
    let mut names: HashSet<String> = NAMED_KEYS.iter().map(|(n, _)| n.to_string()).collect();
    names.extend((1..=FUNCTION_KEYS.len()).map(|n| format!("f{n}")));
    names.extend(LETTERS.iter().map(|(c, _)| c.to_string()));
    names.extend(SYMBOL_KEYS.iter().map(|(c, _, _)| c.to_string()));
    names
}

/// Keys whose neighbors are known; only these can produce a simulated slip.
pub fn qwerty_neighbors(c: char) -> Option<&'static [char]> {
    let neighbors: &[char] = match c.to_ascii_lowercase() {
        'a' => &['q', 'w', 's', 'z', 'x'],
        'b' => &['v', 'g', 'h', 'n'],
        'c' => &['x', 'd', 'f', 'v'],
        'd' => &['s', 'e', 'r', 'f', 'c', 'x'],
        'e' => &['w', 's', 'd', 'r'],
        'f' => &['d', 'r', 't', 'g', 'v', 'c'],
        'g' => &['f', 't', 'y', 'h', 'b', 'v'],
        'h' => &['g', 'y', 'u', 'j', 'n', 'b'],
        'i' => &['u', 'j', 'k', 'o'],
        'j' => &['h', 'u', 'i', 'k', 'm', 'n'],
        'k' => &['j', 'i', 'o', 'l', ',', 'm'],
        'l' => &['k', 'o', 'p', ';', '.'],
        'm' => &['n', 'j', 'k', ','],
        'n' => &['b', 'h', 'j', 'm'],
        'o' => &['i', 'k', 'l', 'p'],
        'p' => &['o', 'l', '['],
        'q' => &['w', 'a'],
        'r' => &['e', 'd', 'f', 't'],
        's' => &['a', 'w', 'e', 'd', 'x', 'z'],
        't' => &['r', 'f', 'g', 'y'],
        'u' => &['y', 'h', 'j', 'i'],
        'v' => &['c', 'f', 'g', 'b'],
        'w' => &['q', 'a', 's', 'e'],
        'x' => &['z', 's', 'd', 'c'],
        'y' => &['t', 'g', 'h', 'u'],
        'z' => &['a', 's', 'x'],
        '1' => &['2', 'q'],
        '2' => &['1', '3', 'q', 'w'],
        '3' => &['2', '4', 'w', 'e'],
        '4' => &['3', '5', 'e', 'r'],
        '5' => &['4', '6', 'r', 't'],
        '6' => &['5', '7', 't', 'y'],
        '7' => &['6', '8', 'y', 'u'],
        '8' => &['7', '9', 'u', 'i'],
        '9' => &['8', '0', 'i', 'o'],
        '0' => &['9', 'o', 'p'],
        _ => return None,
    };
    Some(neighbors)
}

pub fn qwerty_adjacent_char(c: char, rng: &mut impl Rng) -> Option<char> {
    let neighbors = qwerty_neighbors(c)?;
    let chosen = neighbors[rng.gen_range(0..neighbors.len())];
    Some(if c.is_ascii_uppercase() {
        chosen.to_ascii_uppercase()
    } else {
        chosen
    })
}
