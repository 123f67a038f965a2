//! Permission reference table.
//!
//! Platform permissions with their tier and a short description. Special access permissions
//! with an impact comparable to runtime permissions (overlays, accessibility, device
//! administration, package installation) are listed as dangerous.

use super::PermissionTier::{self, Dangerous, Normal};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Version of the reference table. Bumped whenever an entry is added, removed or re-tiered.
pub const TABLE_VERSION: u32 = 3;

static ENTRIES: &[(&str, PermissionTier, &str)] = &[
    // Calendar
    ("android.permission.READ_CALENDAR", Dangerous, "Read calendar events and their details"),
    ("android.permission.WRITE_CALENDAR", Dangerous, "Add or modify calendar events without the owner's knowledge"),
    // Camera and microphone
    ("android.permission.CAMERA", Dangerous, "Take pictures and record video"),
    ("android.permission.RECORD_AUDIO", Dangerous, "Record audio with the microphone at any time"),
    // Contacts and accounts
    ("android.permission.READ_CONTACTS", Dangerous, "Read all stored contacts"),
    ("android.permission.WRITE_CONTACTS", Dangerous, "Modify or add stored contacts"),
    ("android.permission.GET_ACCOUNTS", Dangerous, "List the accounts registered on the device"),
    // Location
    ("android.permission.ACCESS_FINE_LOCATION", Dangerous, "Track the precise GPS location"),
    ("android.permission.ACCESS_COARSE_LOCATION", Dangerous, "Track the approximate location"),
    ("android.permission.ACCESS_BACKGROUND_LOCATION", Dangerous, "Track the location while the app is not in use"),
    ("android.permission.ACCESS_MEDIA_LOCATION", Dangerous, "Read the locations stored in photos and videos"),
    // Phone
    ("android.permission.READ_PHONE_STATE", Dangerous, "Read the phone number, network and call state"),
    ("android.permission.READ_PHONE_NUMBERS", Dangerous, "Read the phone numbers of the device"),
    ("android.permission.CALL_PHONE", Dangerous, "Place phone calls without going through the dialer"),
    ("android.permission.ANSWER_PHONE_CALLS", Dangerous, "Answer incoming phone calls"),
    ("android.permission.READ_CALL_LOG", Dangerous, "Read the history of made and received calls"),
    ("android.permission.WRITE_CALL_LOG", Dangerous, "Modify the call history"),
    ("android.permission.ADD_VOICEMAIL", Dangerous, "Add voicemail messages"),
    ("android.permission.USE_SIP", Dangerous, "Make and receive internet calls"),
    ("android.permission.PROCESS_OUTGOING_CALLS", Dangerous, "See, redirect or block outgoing calls"),
    ("android.permission.ACCEPT_HANDOVER", Dangerous, "Continue calls started in another app"),
    // Sensors and activity
    ("android.permission.BODY_SENSORS", Dangerous, "Read heart rate and other body sensors"),
    ("android.permission.BODY_SENSORS_BACKGROUND", Dangerous, "Read body sensors while the app is not in use"),
    ("android.permission.ACTIVITY_RECOGNITION", Dangerous, "Recognize physical activity such as walking"),
    // SMS
    ("android.permission.SEND_SMS", Dangerous, "Send text messages, which may cost money"),
    ("android.permission.RECEIVE_SMS", Dangerous, "Intercept incoming text messages"),
    ("android.permission.READ_SMS", Dangerous, "Read all stored text messages"),
    ("android.permission.RECEIVE_WAP_PUSH", Dangerous, "Receive WAP push messages"),
    ("android.permission.RECEIVE_MMS", Dangerous, "Intercept incoming multimedia messages"),
    // Storage and media
    ("android.permission.READ_EXTERNAL_STORAGE", Dangerous, "Read the files on shared storage"),
    ("android.permission.WRITE_EXTERNAL_STORAGE", Dangerous, "Create, modify or delete files on shared storage"),
    ("android.permission.READ_MEDIA_IMAGES", Dangerous, "Read the images on shared storage"),
    ("android.permission.READ_MEDIA_VIDEO", Dangerous, "Read the videos on shared storage"),
    ("android.permission.READ_MEDIA_AUDIO", Dangerous, "Read the audio files on shared storage"),
    ("android.permission.MANAGE_EXTERNAL_STORAGE", Dangerous, "Manage every file on shared storage"),
    // Nearby devices
    ("android.permission.BLUETOOTH_SCAN", Dangerous, "Discover nearby Bluetooth devices"),
    ("android.permission.BLUETOOTH_CONNECT", Dangerous, "Connect to paired Bluetooth devices"),
    ("android.permission.BLUETOOTH_ADVERTISE", Dangerous, "Advertise to nearby Bluetooth devices"),
    ("android.permission.UWB_RANGING", Dangerous, "Measure the distance to nearby ultra-wideband devices"),
    ("android.permission.NEARBY_WIFI_DEVICES", Dangerous, "Discover and connect to nearby Wi-Fi devices"),
    ("android.permission.POST_NOTIFICATIONS", Dangerous, "Post notifications"),
    // Special access
    ("android.permission.SYSTEM_ALERT_WINDOW", Dangerous, "Draw over other apps, a common phishing technique"),
    ("android.permission.BIND_ACCESSIBILITY_SERVICE", Dangerous, "Observe and drive every user interaction as an accessibility service"),
    ("android.permission.BIND_DEVICE_ADMIN", Dangerous, "Administer the device, including locking and wiping it"),
    ("android.permission.BIND_NOTIFICATION_LISTENER_SERVICE", Dangerous, "Read every notification, including one-time codes"),
    ("android.permission.INSTALL_PACKAGES", Dangerous, "Install other applications silently"),
    ("android.permission.DELETE_PACKAGES", Dangerous, "Uninstall other applications"),
    ("android.permission.REQUEST_INSTALL_PACKAGES", Dangerous, "Ask to install other applications"),
    ("android.permission.WRITE_SETTINGS", Dangerous, "Modify the system settings"),
    ("android.permission.PACKAGE_USAGE_STATS", Dangerous, "Read which apps are used and when"),
    ("android.permission.READ_LOGS", Dangerous, "Read the system logs of every app"),
    // Normal
    ("android.permission.INTERNET", Normal, "Open network sockets"),
    ("android.permission.ACCESS_NETWORK_STATE", Normal, "View network connections"),
    ("android.permission.ACCESS_WIFI_STATE", Normal, "View Wi-Fi connections"),
    ("android.permission.CHANGE_WIFI_STATE", Normal, "Connect to and disconnect from Wi-Fi"),
    ("android.permission.CHANGE_NETWORK_STATE", Normal, "Change network connectivity"),
    ("android.permission.CHANGE_WIFI_MULTICAST_STATE", Normal, "Receive Wi-Fi multicast packets"),
    ("android.permission.BLUETOOTH", Normal, "Pair with Bluetooth devices"),
    ("android.permission.BLUETOOTH_ADMIN", Normal, "Discover and pair Bluetooth devices"),
    ("android.permission.NFC", Normal, "Use near field communication"),
    ("android.permission.WAKE_LOCK", Normal, "Keep the device from sleeping"),
    ("android.permission.VIBRATE", Normal, "Control the vibrator"),
    ("android.permission.RECEIVE_BOOT_COMPLETED", Normal, "Run at startup"),
    ("android.permission.FOREGROUND_SERVICE", Normal, "Run foreground services"),
    ("android.permission.ACCESS_NOTIFICATION_POLICY", Normal, "Access the do not disturb policy"),
    ("android.permission.REQUEST_IGNORE_BATTERY_OPTIMIZATIONS", Normal, "Ask to ignore battery optimizations"),
    ("android.permission.SCHEDULE_EXACT_ALARM", Normal, "Schedule alarms at exact times"),
    ("android.permission.USE_BIOMETRIC", Normal, "Use biometric hardware"),
    ("android.permission.USE_FINGERPRINT", Normal, "Use fingerprint hardware"),
    ("android.permission.SET_WALLPAPER", Normal, "Set the wallpaper"),
    ("android.permission.EXPAND_STATUS_BAR", Normal, "Expand or collapse the status bar"),
    ("android.permission.KILL_BACKGROUND_PROCESSES", Normal, "Close other apps running in the background"),
    ("android.permission.MODIFY_AUDIO_SETTINGS", Normal, "Change the audio settings"),
    ("android.permission.READ_SYNC_SETTINGS", Normal, "Read the sync settings"),
    ("android.permission.WRITE_SYNC_SETTINGS", Normal, "Toggle sync on and off"),
    ("android.permission.GET_PACKAGE_SIZE", Normal, "Measure app storage space"),
    ("android.permission.REORDER_TASKS", Normal, "Reorder running apps"),
    ("android.permission.TRANSMIT_IR", Normal, "Transmit infrared"),
    ("android.permission.QUERY_ALL_PACKAGES", Normal, "List every installed application"),
    ("android.permission.USE_CREDENTIALS", Normal, "Use the credentials of registered accounts"),
    ("android.permission.MANAGE_ACCOUNTS", Normal, "Add and remove accounts"),
    ("android.permission.AUTHENTICATE_ACCOUNTS", Normal, "Create accounts and set passwords"),
    ("com.android.alarm.permission.SET_ALARM", Normal, "Set an alarm"),
    ("com.android.launcher.permission.INSTALL_SHORTCUT", Normal, "Install home screen shortcuts"),
    ("com.google.android.c2dm.permission.RECEIVE", Normal, "Receive push messages"),
];

lazy_static! {
    static ref INDEX: HashMap<&'static str, (PermissionTier, &'static str)> = ENTRIES
        .iter()
        .map(|(name, tier, description)| (*name, (*tier, *description)))
        .collect();
}

/// Looks up a permission in the reference table.
pub(super) fn get(name: &str) -> Option<(PermissionTier, &'static str)> {
    INDEX.get(name).copied()
}
